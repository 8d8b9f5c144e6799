/// Project document endpoints
///
/// Only metadata is stored here; downloads go through short-lived signed
/// URLs for the document's bucket.

use crate::{
    api::AppState,
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::documents::{type_summary, DocumentFilter, DocumentStore, NewDocument},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

const SIGNED_URL_TTL_SECS: u64 = 3600;

pub fn create_document_routes() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents).post(create_document))
        .route("/api/documents/{id}", get(get_document).delete(delete_document))
        .route("/api/documents/{id}/url", get(document_url))
}

/// GET /api/documents?project_id=&document_type=&uploaded_by=&search=&date_from=&date_to=
async fn list_documents(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Json<Value>> {
    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
        if to < from {
            return Err(ApiError::bad_request("date_to must not be before date_from"));
        }
    }

    let page = pagination.resolve();
    let (documents, total) = DocumentStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list documents: {:#}", e);
            ApiError::from(e)
        })?;

    let summary = type_summary(total, &documents);
    let mut body = page.envelope(documents, total);
    body["summary"] = summary;
    Ok(Json(body))
}

/// POST /api/documents
async fn create_document(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewDocument>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("projects.update")?;
    let filename = payload.validate().map_err(ApiError::BadRequest)?;

    let created = DocumentStore::new(&state.db)
        .create(filename, &payload, user.id())
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown project"),
            other => other,
        })?;

    tracing::info!("🔥 Registered document {} ({})", created.id, created.filename);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/documents/{id}
async fn get_document(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = DocumentStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Document not found"))?;
    Ok(Json(json!(document)))
}

/// DELETE /api/documents/{id}
async fn delete_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;

    let deleted = DocumentStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Document not found"))?;

    if let Some(path) = deleted.storage_path.clone() {
        if let Err(e) = state.storage.remove(&deleted.bucket_name, &[path]).await {
            tracing::warn!("⚠️ Document {} deleted but its file remains: {:#}", id, e);
        }
    }

    tracing::info!("🔥 Deleted document {} ({})", id, deleted.filename);
    Ok(Json(json!({ "message": "Document deleted successfully" })))
}

/// GET /api/documents/{id}/url
async fn document_url(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = DocumentStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Document not found"))?;
    let path = document
        .storage_path
        .as_deref()
        .ok_or_else(|| ApiError::not_found("Document has no stored file"))?;

    let url = state
        .storage
        .create_signed_url(&document.bucket_name, path, SIGNED_URL_TTL_SECS)
        .await
        .map_err(|e| {
            tracing::error!("Failed to sign URL for document {}: {:#}", id, e);
            ApiError::Internal(e)
        })?;

    Ok(Json(json!({
        "url": url,
        "filename": document.filename,
        "expires_in": SIGNED_URL_TTL_SECS,
    })))
}
