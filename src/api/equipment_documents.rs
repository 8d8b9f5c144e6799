/// Equipment document endpoints
///
/// Files live in the `equipment-documents` bucket. Deleting deactivates the
/// row; removing the stored object afterwards is best effort.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    storage::EQUIPMENT_DOCUMENTS_BUCKET,
    store::{
        equipment_documents::{
            EquipmentDocumentFilter, EquipmentDocumentStore, NewEquipmentDocument,
            MAX_DOCUMENT_BYTES,
        },
        EquipmentStore,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

const SIGNED_URL_TTL_SECS: u64 = 3600;

pub fn create_equipment_document_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/equipment/documents",
            get(list_documents).post(create_document),
        )
        .route(
            "/api/equipment/documents/{id}",
            get(get_document).delete(delete_document),
        )
}

fn check_metadata(payload: &NewEquipmentDocument) -> ApiResult<()> {
    if let Some(size) = payload.file_size_bytes {
        if size < 0 {
            return Err(ApiError::bad_request("file_size_bytes must be zero or greater"));
        }
        if size > MAX_DOCUMENT_BYTES {
            return Err(ApiError::bad_request("File size must not exceed 10MB"));
        }
    }
    if let (Some(issued), Some(expires)) = (payload.issue_date, payload.expiry_date) {
        if expires < issued {
            return Err(ApiError::bad_request("expiry_date must not be before issue_date"));
        }
    }
    Ok(())
}

/// GET /api/equipment/documents?equipment_id=&document_type=&expiring_within_days=&expired_only=&active_only=
async fn list_documents(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<EquipmentDocumentFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (documents, total) = EquipmentDocumentStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list equipment documents: {:#}", e);
            ApiError::from(e)
        })?;

    let today = Utc::now().date_naive();
    let items: Vec<Value> = documents.iter().map(|d| d.to_json(today)).collect();
    Ok(Json(page.envelope(items, total)))
}

/// POST /api/equipment/documents
/// Body: metadata of an object already uploaded to the bucket
async fn create_document(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewEquipmentDocument>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("equipment.update")?;
    let equipment_id = payload
        .equipment_id
        .ok_or_else(|| ApiError::bad_request("equipment_id is required"))?;
    let document_type = required(payload.document_type.as_deref(), "document_type")?;
    let document_name = required(payload.document_name.as_deref(), "document_name")?;
    let file_path = required(payload.file_path.as_deref(), "file_path")?;
    check_metadata(&payload)?;

    EquipmentStore::new(&state.db)
        .get(equipment_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Equipment not found"))?;

    let created = EquipmentDocumentStore::new(&state.db)
        .create(equipment_id, document_type, document_name, file_path, &payload, user.id())
        .await?;

    tracing::info!("🔥 Attached {} to equipment {}", created.document_type, equipment_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "document": created.to_json(Utc::now().date_naive()),
            "message": "Document uploaded successfully",
        })),
    ))
}

/// GET /api/equipment/documents/{id}
async fn get_document(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = EquipmentDocumentStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Document not found"))?;

    let signed_url = match state
        .storage
        .create_signed_url(EQUIPMENT_DOCUMENTS_BUCKET, &document.file_path, SIGNED_URL_TTL_SECS)
        .await
    {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!("⚠️ Could not sign URL for {}: {:#}", document.file_path, e);
            None
        }
    };

    let mut body = document.to_json(Utc::now().date_naive());
    body["signed_url"] = json!(signed_url);
    Ok(Json(body))
}

/// DELETE /api/equipment/documents/{id}
async fn delete_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("equipment.update")?;

    let document = EquipmentDocumentStore::new(&state.db)
        .deactivate(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Document not found"))?;

    if let Err(e) = state
        .storage
        .remove(EQUIPMENT_DOCUMENTS_BUCKET, &[document.file_path.clone()])
        .await
    {
        tracing::warn!("⚠️ Document {} deactivated but file {} remains: {:#}", id, document.file_path, e);
    }

    tracing::info!("🔥 Deleted document {} of equipment {}", id, document.equipment_id);
    Ok(Json(json!({
        "success": true,
        "message": "Document deleted successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn metadata(size: Option<i64>) -> NewEquipmentDocument {
        NewEquipmentDocument {
            equipment_id: Some(Uuid::new_v4()),
            document_type: Some("manual".into()),
            document_name: Some("Bedienungsanleitung.pdf".into()),
            file_path: Some("eq/manual.pdf".into()),
            file_size_bytes: size,
            mime_type: None,
            issue_date: None,
            expiry_date: None,
            notes: None,
        }
    }

    #[test]
    fn ten_megabytes_is_the_limit() {
        assert!(check_metadata(&metadata(Some(MAX_DOCUMENT_BYTES))).is_ok());
        assert_eq!(
            check_metadata(&metadata(Some(MAX_DOCUMENT_BYTES + 1)))
                .unwrap_err()
                .to_string(),
            "File size must not exceed 10MB"
        );
        assert!(check_metadata(&metadata(None)).is_ok());
    }

    #[test]
    fn expiry_before_issue_is_rejected() {
        let mut payload = metadata(None);
        payload.issue_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        payload.expiry_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(check_metadata(&payload).is_err());
    }
}
