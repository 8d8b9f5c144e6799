//! Project document metadata; file bytes live in object storage

use crate::db::{Database, Page};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const DEFAULT_BUCKET: &str = "project-documents";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub bucket_name: String,
    pub storage_path: Option<String>,
    pub document_type: String,
    pub description: Option<String>,
    pub upload_date: DateTime<Utc>,
    pub uploaded_by: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub project_name: Option<String>,
    #[sqlx(default)]
    pub uploader_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentFilter {
    pub project_id: Option<Uuid>,
    pub document_type: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub search: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct NewDocument {
    pub project_id: Option<Uuid>,
    pub filename: Option<String>,
    pub original_filename: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub bucket_name: Option<String>,
    pub storage_path: Option<String>,
    pub document_type: Option<String>,
    pub description: Option<String>,
}

impl NewDocument {
    pub fn validate(&self) -> Result<&str, String> {
        let filename = self
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| "filename is required".to_string())?;
        if matches!(self.file_size, Some(size) if size <= 0) {
            return Err("file_size must be greater than 0".to_string());
        }
        Ok(filename)
    }
}

/// Count per document type for the listed page
pub fn type_summary(total: i64, documents: &[Document]) -> Value {
    let mut by_type = serde_json::Map::new();
    for document in documents {
        let entry = by_type
            .entry(document.document_type.clone())
            .or_insert_with(|| json!(0));
        *entry = json!(entry.as_i64().unwrap_or(0) + 1);
    }
    let total_size: i64 = documents.iter().filter_map(|d| d.file_size).sum();

    json!({
        "total_documents": total,
        "total_size": total_size,
        "by_type": by_type,
    })
}

const DOCUMENT_SELECT: &str = "SELECT d.*, p.name AS project_name, \
        NULLIF(TRIM(CONCAT(u.first_name, ' ', u.last_name)), '') AS uploader_name \
     FROM documents d \
     LEFT JOIN projects p ON p.id = d.project_id \
     LEFT JOIN users u ON u.id = d.uploaded_by";

#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: PgPool,
}

impl DocumentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &DocumentFilter) {
        builder.push(" WHERE d.is_active");
        if let Some(project_id) = filter.project_id {
            builder.push(" AND d.project_id = ").push_bind(project_id);
        }
        if let Some(kind) = &filter.document_type {
            builder.push(" AND d.document_type = ").push_bind(kind.clone());
        }
        if let Some(uploader) = filter.uploaded_by {
            builder.push(" AND d.uploaded_by = ").push_bind(uploader);
        }
        if let Some(from) = filter.date_from {
            builder.push(" AND d.upload_date::date >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            builder.push(" AND d.upload_date::date <= ").push_bind(to);
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            builder
                .push(" AND (d.filename ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR d.original_filename ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR d.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn list(&self, filter: &DocumentFilter, page: Page) -> Result<(Vec<Document>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM documents d");
        Self::push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(DOCUMENT_SELECT);
        Self::push_filters(&mut select, filter);
        select
            .push(" ORDER BY d.upload_date DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let documents = select.build_query_as::<Document>().fetch_all(&self.pool).await?;

        Ok((documents, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<Document> {
        let document = sqlx::query_as::<_, Document>(&format!("{} WHERE d.id = $1", DOCUMENT_SELECT))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(document)
    }

    pub async fn create(&self, filename: &str, document: &NewDocument, uploaded_by: Uuid) -> Result<Document> {
        let created = sqlx::query_as::<_, Document>(
            "INSERT INTO documents (project_id, filename, original_filename, file_type, file_size, \
                bucket_name, storage_path, document_type, description, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(document.project_id)
        .bind(filename)
        .bind(document.original_filename.as_deref().unwrap_or(filename))
        .bind(&document.file_type)
        .bind(document.file_size)
        .bind(document.bucket_name.as_deref().unwrap_or(DEFAULT_BUCKET))
        .bind(&document.storage_path)
        .bind(document.document_type.as_deref().unwrap_or("general"))
        .bind(&document.description)
        .bind(uploaded_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// Delete the row and return it so the caller can remove the stored file
    pub async fn delete(&self, id: Uuid) -> Result<Document> {
        let deleted = sqlx::query_as::<_, Document>("DELETE FROM documents WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_document(filename: Option<&str>, file_size: Option<i64>) -> NewDocument {
        NewDocument {
            project_id: None,
            filename: filename.map(String::from),
            original_filename: None,
            file_type: None,
            file_size,
            bucket_name: None,
            storage_path: None,
            document_type: None,
            description: None,
        }
    }

    #[test]
    fn filename_is_required() {
        assert!(new_document(None, None).validate().is_err());
        assert!(new_document(Some("  "), None).validate().is_err());
        assert_eq!(new_document(Some("plan.pdf"), Some(10)).validate(), Ok("plan.pdf"));
    }

    #[test]
    fn empty_files_are_rejected() {
        assert!(new_document(Some("plan.pdf"), Some(0)).validate().is_err());
    }
}
