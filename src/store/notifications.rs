//! In-app notifications

use crate::db::{Database, Page};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const DEFAULT_EXPIRY_DAYS: i64 = 30;

pub const PRIORITIES: [&str; 4] = ["low", "normal", "high", "urgent"];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub priority: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub data: Value,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Row plus the `type` and `body` aliases the dashboard reads
    pub fn to_json(&self) -> Value {
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert("type".into(), json!(self.notification_type));
            map.insert("body".into(), json!(self.message));
        }
        value
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilter {
    pub user_id: Option<Uuid>,
    pub read: Option<bool>,
    pub priority: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub user_id: Option<Uuid>,
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type", alias = "notification_type")]
    pub notification_type: Option<String>,
    pub priority: Option<String>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub data: Option<Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotificationSummary {
    pub total_count: i64,
    pub unread_count: i64,
    pub urgent_count: i64,
}

pub fn default_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(DEFAULT_EXPIRY_DAYS)
}

#[derive(Debug, Clone)]
pub struct NotificationStore {
    pool: PgPool,
}

impl NotificationStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &NotificationFilter) {
        builder.push(" WHERE 1=1");
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(read) = filter.read {
            builder.push(" AND is_read = ").push_bind(read);
        }
        if let Some(priority) = &filter.priority {
            builder.push(" AND priority = ").push_bind(priority.clone());
        }
        if let Some(after) = filter.created_after {
            builder.push(" AND created_at >= ").push_bind(after);
        }
    }

    pub async fn list(&self, filter: &NotificationFilter, page: Page) -> Result<(Vec<Notification>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM in_app_notifications");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT * FROM in_app_notifications");
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build_query_as::<Notification>().fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    /// Totals for one user, or for everyone when `user_id` is absent
    pub async fn summary(&self, user_id: Option<Uuid>) -> Result<NotificationSummary> {
        let (total_count, unread_count, urgent_count): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE NOT is_read), \
                COUNT(*) FILTER (WHERE NOT is_read AND priority = 'urgent') \
             FROM in_app_notifications \
             WHERE ($1::uuid IS NULL OR user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(NotificationSummary {
            total_count,
            unread_count,
            urgent_count,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Notification> {
        let row = sqlx::query_as::<_, Notification>("SELECT * FROM in_app_notifications WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn create(&self, title: &str, message: &str, new: &NewNotification) -> Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            "INSERT INTO in_app_notifications \
                (user_id, title, message, notification_type, priority, action_url, action_label, data, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(new.user_id)
        .bind(title)
        .bind(message)
        .bind(new.notification_type.as_deref().unwrap_or("info"))
        .bind(new.priority.as_deref().unwrap_or("normal"))
        .bind(&new.action_url)
        .bind(&new.action_label)
        .bind(new.data.clone().unwrap_or_else(|| json!({})))
        .bind(new.expires_at.unwrap_or_else(|| default_expiry(Utc::now())))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// `read_at` follows the flag: set when read, cleared when unread
    pub async fn set_read(&self, id: Uuid, read: bool) -> Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(
            "UPDATE in_app_notifications \
             SET is_read = $2, read_at = CASE WHEN $2 THEN NOW() ELSE NULL END \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(read)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Returns the number of notifications touched
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE in_app_notifications SET is_read = TRUE, read_at = NOW() \
             WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>("DELETE FROM in_app_notifications WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Same user and title within the last `hours`
    pub async fn recently_sent(&self, user_id: Uuid, title: &str, hours: i64) -> Result<bool> {
        let since = Utc::now() - Duration::hours(hours);
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM in_app_notifications \
             WHERE user_id = $1 AND title = $2 AND created_at >= $3)",
        )
        .bind(user_id)
        .bind(title)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_carries_type_and_body_aliases() {
        let n = Notification {
            id: Uuid::new_v4(),
            user_id: None,
            title: "Lieferung heute".into(),
            message: "Materiallieferung wird heute erwartet.".into(),
            notification_type: "reminder".into(),
            priority: "high".into(),
            is_read: false,
            read_at: None,
            action_url: None,
            action_label: None,
            data: json!({}),
            expires_at: None,
            created_at: Utc::now(),
        };
        let body = n.to_json();
        assert_eq!(body["type"], "reminder");
        assert_eq!(body["body"], body["message"]);
    }

    #[test]
    fn default_expiry_is_thirty_days_out() {
        let now = Utc::now();
        assert_eq!((default_expiry(now) - now).num_days(), 30);
    }

    #[test]
    fn create_body_accepts_type_alias() {
        let body: NewNotification =
            serde_json::from_value(json!({ "title": "t", "message": "m", "type": "warning" })).unwrap();
        assert_eq!(body.notification_type.as_deref(), Some("warning"));
    }
}
