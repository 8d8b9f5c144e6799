//! Documents attached to equipment (manuals, certificates, inspections)
//!
//! Rows describe objects already uploaded to the `equipment-documents`
//! bucket. Deleting a document only deactivates the row.

use crate::db::{Database, Page};
use crate::store::vehicles::EXPIRING_WITHIN_DAYS;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Upload limit for a single document
pub const MAX_DOCUMENT_BYTES: i64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EquipmentDocument {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub document_type: String,
    pub document_name: String,
    pub file_path: String,
    pub file_size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub uploaded_by_user_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub equipment_name: Option<String>,
}

impl EquipmentDocument {
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date.map(|date| (date - today).num_days())
    }

    pub fn to_json(&self, today: NaiveDate) -> Value {
        let days = self.days_until_expiry(today);
        let mut value = json!(self);
        if let Some(map) = value.as_object_mut() {
            map.insert("days_until_expiry".into(), json!(days));
            map.insert(
                "is_expiring_soon".into(),
                json!(days.is_some_and(|d| (0..=EXPIRING_WITHIN_DAYS).contains(&d))),
            );
            map.insert("is_expired".into(), json!(days.is_some_and(|d| d < 0)));
        }
        value
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipmentDocumentFilter {
    pub equipment_id: Option<Uuid>,
    pub document_type: Option<String>,
    pub expiring_within_days: Option<i64>,
    pub expired_only: Option<bool>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NewEquipmentDocument {
    pub equipment_id: Option<Uuid>,
    pub document_type: Option<String>,
    pub document_name: Option<String>,
    pub file_path: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

const DOCUMENT_SELECT: &str = "SELECT d.*, e.name AS equipment_name \
     FROM equipment_documents d \
     LEFT JOIN equipment e ON e.id = d.equipment_id";

#[derive(Debug, Clone)]
pub struct EquipmentDocumentStore {
    pool: PgPool,
}

impl EquipmentDocumentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &EquipmentDocumentFilter) {
        builder.push(" WHERE 1=1");
        if filter.active_only.unwrap_or(true) {
            builder.push(" AND d.is_active");
        }
        if let Some(id) = filter.equipment_id {
            builder.push(" AND d.equipment_id = ").push_bind(id);
        }
        if let Some(kind) = &filter.document_type {
            builder.push(" AND d.document_type = ").push_bind(kind.clone());
        }
        if let Some(days) = filter.expiring_within_days {
            builder
                .push(" AND d.expiry_date BETWEEN CURRENT_DATE AND CURRENT_DATE + ")
                .push_bind(i32::try_from(days.max(0)).unwrap_or(i32::MAX));
        }
        if filter.expired_only.unwrap_or(false) {
            builder.push(" AND d.expiry_date < CURRENT_DATE");
        }
    }

    pub async fn list(
        &self,
        filter: &EquipmentDocumentFilter,
        page: Page,
    ) -> Result<(Vec<EquipmentDocument>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM equipment_documents d");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(DOCUMENT_SELECT);
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY d.expiry_date ASC NULLS LAST, d.created_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<EquipmentDocument>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<EquipmentDocument> {
        let document = sqlx::query_as::<_, EquipmentDocument>(&format!(
            "{} WHERE d.id = $1 AND d.is_active",
            DOCUMENT_SELECT
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(document)
    }

    pub async fn create(
        &self,
        equipment_id: Uuid,
        document_type: &str,
        document_name: &str,
        file_path: &str,
        document: &NewEquipmentDocument,
        uploaded_by: Uuid,
    ) -> Result<EquipmentDocument> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO equipment_documents (equipment_id, document_type, document_name, file_path, \
                file_size_bytes, mime_type, issue_date, expiry_date, notes, uploaded_by_user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id",
        )
        .bind(equipment_id)
        .bind(document_type)
        .bind(document_name)
        .bind(file_path)
        .bind(document.file_size_bytes)
        .bind(&document.mime_type)
        .bind(document.issue_date)
        .bind(document.expiry_date)
        .bind(&document.notes)
        .bind(uploaded_by)
        .fetch_one(&self.pool)
        .await?;

        self.get(id).await
    }

    /// Deactivate and return the row so the caller can drop the stored file
    pub async fn deactivate(&self, id: Uuid) -> Result<EquipmentDocument> {
        let document = sqlx::query_as::<_, EquipmentDocument>(
            "UPDATE equipment_documents SET is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND is_active RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(expiry_date: Option<NaiveDate>) -> EquipmentDocument {
        EquipmentDocument {
            id: Uuid::new_v4(),
            equipment_id: Uuid::new_v4(),
            document_type: "UVV-Prüfung".into(),
            document_name: "uvv-2024.pdf".into(),
            file_path: "eq/uvv-2024.pdf".into(),
            file_size_bytes: Some(20_480),
            mime_type: Some("application/pdf".into()),
            issue_date: None,
            expiry_date,
            notes: None,
            uploaded_by_user_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            equipment_name: None,
        }
    }

    #[test]
    fn expiry_flags_follow_the_sixty_day_window() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let soon = document(NaiveDate::from_ymd_opt(2024, 7, 31)).to_json(today);
        assert_eq!(soon["days_until_expiry"], 60);
        assert_eq!(soon["is_expiring_soon"], true);
        assert_eq!(soon["is_expired"], false);

        let expired = document(NaiveDate::from_ymd_opt(2024, 5, 30)).to_json(today);
        assert_eq!(expired["is_expired"], true);
        assert_eq!(expired["is_expiring_soon"], false);

        let open = document(None).to_json(today);
        assert!(open["days_until_expiry"].is_null());
        assert_eq!(open["is_expired"], false);
    }
}
