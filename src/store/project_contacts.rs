//! Customer-side contacts of a project

use crate::db::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProjectContact {
    pub id: Uuid,
    pub project_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewProjectContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContactQuery {
    pub contact_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ProjectContactStore {
    pool: PgPool,
}

impl ProjectContactStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub async fn list(&self, project_id: Uuid) -> Result<Vec<ProjectContact>> {
        let contacts = sqlx::query_as::<_, ProjectContact>(
            "SELECT * FROM project_contacts WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(contacts)
    }

    pub async fn create(
        &self,
        project_id: Uuid,
        first_name: &str,
        last_name: &str,
        contact: &NewProjectContact,
    ) -> Result<ProjectContact> {
        let created = sqlx::query_as::<_, ProjectContact>(
            "INSERT INTO project_contacts \
                (project_id, first_name, last_name, department, phone, email, position, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(project_id)
        .bind(first_name)
        .bind(last_name)
        .bind(&contact.department)
        .bind(&contact.phone)
        .bind(&contact.email)
        .bind(&contact.position)
        .bind(&contact.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn delete(&self, project_id: Uuid, contact_id: Uuid) -> Result<()> {
        sqlx::query_scalar::<_, Uuid>(
            "DELETE FROM project_contacts WHERE id = $1 AND project_id = $2 RETURNING id",
        )
        .bind(contact_id)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(())
    }
}
