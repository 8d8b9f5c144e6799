/// Work entry endpoints
///
/// Field crews log meters per stage; project managers approve or reject.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::work_entries::{NewWorkEntry, WorkEntryFilter, WorkEntryStore, WorkEntryUpdate},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Rejection {
    pub rejection_reason: Option<String>,
    pub reason: Option<String>,
}

pub fn create_work_entry_routes() -> Router<AppState> {
    Router::new()
        .route("/api/work-entries", get(list_entries).post(create_entry))
        .route(
            "/api/work-entries/{id}",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .route("/api/work-entries/{id}/approve", post(approve_entry))
        .route("/api/work-entries/{id}/reject", post(reject_entry))
}

/// GET /api/work-entries?project_id=&user_id=&crew_id=&stage_code=&approved=
async fn list_entries(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<WorkEntryFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (entries, total) = WorkEntryStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list work entries: {:#}", e);
            ApiError::from(e)
        })?;

    Ok(Json(page.envelope(entries, total)))
}

/// POST /api/work-entries
async fn create_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewWorkEntry>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("work_entries.create")?;
    let valid = payload.validate().map_err(ApiError::BadRequest)?;

    let created = WorkEntryStore::new(&state.db)
        .create(&valid, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown project, user or crew"),
            other => other,
        })?;

    tracing::info!(
        "🔥 Logged {} m of {} on project {}",
        created.meters_done_m,
        created.stage_code,
        created.project_id
    );
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/work-entries/{id}
async fn get_entry(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let entry = WorkEntryStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Work entry not found"))?;
    Ok(Json(json!(entry)))
}

/// PUT /api/work-entries/{id}
async fn update_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkEntryUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("work_entries.update")?;
    payload.validate().map_err(ApiError::BadRequest)?;

    let updated = WorkEntryStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Work entry not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated work entry {}", id);
    Ok(Json(json!(updated)))
}

/// DELETE /api/work-entries/{id}
async fn delete_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("work_entries.delete")?;

    WorkEntryStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Work entry not found"))?;

    tracing::info!("🔥 Deleted work entry {}", id);
    Ok(Json(json!({ "message": "Work entry deleted successfully" })))
}

/// POST /api/work-entries/{id}/approve
async fn approve_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("work_entries.approve")?;

    let entry = WorkEntryStore::new(&state.db)
        .approve(id, user.id())
        .await
        .map_err(|e| ApiError::or_not_found(e, "Work entry not found"))?;

    tracing::info!("✅ Work entry {} approved by {}", id, user.id());
    Ok(Json(json!({
        "message": "Work entry approved",
        "work_entry": entry,
    })))
}

/// POST /api/work-entries/{id}/reject
/// Body: { "rejection_reason": "..." }
async fn reject_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<Rejection>,
) -> ApiResult<Json<Value>> {
    user.require("work_entries.approve")?;
    let reason = required(
        payload.rejection_reason.as_deref().or(payload.reason.as_deref()),
        "rejection_reason",
    )?;

    let entry = WorkEntryStore::new(&state.db)
        .reject(id, user.id(), reason)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Work entry not found"))?;

    tracing::info!("❌ Work entry {} rejected by {}", id, user.id());
    Ok(Json(json!({
        "message": "Work entry rejected",
        "work_entry": entry,
    })))
}
