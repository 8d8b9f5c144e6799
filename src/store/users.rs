//! User accounts

use crate::db::{Changes, Database, Page};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Every column except `pin_code`, which never leaves the database
const USER_COLUMNS: &str = "id, email, phone, first_name, last_name, role, skills, is_active, \
     language_preference, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub skills: Value,
    pub is_active: bool,
    pub language_preference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Option<String>,
    pub pin_code: Option<String>,
    pub skills: Option<Value>,
    pub language_preference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub pin_code: Option<String>,
    pub skills: Option<Value>,
    pub is_active: Option<bool>,
    pub language_preference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Look up a login candidate by email or phone together with the PIN
    pub async fn find_by_credentials(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        pin_code: &str,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users \
             WHERE ((email IS NOT NULL AND email = $1) OR (phone IS NOT NULL AND phone = $2)) \
               AND pin_code = $3 \
             LIMIT 1",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(phone)
        .bind(pin_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
        builder.push(" WHERE 1=1");
        if let Some(role) = &filter.role {
            builder.push(" AND role = ").push_bind(role.clone());
        }
        if let Some(active) = filter.is_active {
            builder.push(" AND is_active = ").push_bind(active);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR last_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(&self, filter: &UserFilter, page: Page) -> Result<(Vec<User>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(format!("SELECT {} FROM users", USER_COLUMNS));
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY first_name, last_name LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let users = select.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// Insert a user; `pin_code` must already be validated or generated
    pub async fn create(&self, user: &NewUser, pin_code: &str) -> Result<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, phone, first_name, last_name, role, pin_code, skills, language_preference) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_deref().unwrap_or("worker"))
        .bind(pin_code)
        .bind(user.skills.clone().unwrap_or_else(|| Value::Array(Vec::new())))
        .bind(user.language_preference.as_deref().unwrap_or("de"))
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Apply the provided fields; `Ok(None)` when nothing was provided
    pub async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>> {
        let mut changes = Changes::new("users");
        changes
            .set("email", update.email)
            .set("phone", update.phone)
            .set("first_name", update.first_name)
            .set("last_name", update.last_name)
            .set("role", update.role)
            .set("pin_code", update.pin_code)
            .set("skills", update.skills)
            .set("is_active", update.is_active)
            .set("language_preference", update.language_preference);
        if changes.is_empty() {
            return Ok(None);
        }
        changes.set_raw("updated_at = NOW()");

        let mut query = changes.finish(id, USER_COLUMNS);
        let user = query.build_query_as::<User>().fetch_one(&self.pool).await?;
        Ok(Some(user))
    }

    /// Soft delete: the account stays for historic work entries
    pub async fn deactivate(&self, id: Uuid) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}
