/// Equipment inventory and assignment endpoints

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::equipment::{
        AssignmentFilter, EquipmentFilter, EquipmentStore, EquipmentUpdate, NewAssignment,
        NewEquipment, EQUIPMENT_STATUSES,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub fn create_equipment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/equipment", get(list_equipment).post(create_equipment))
        .route(
            "/api/equipment/assignments",
            get(list_assignments).post(create_assignment),
        )
        .route(
            "/api/equipment/assignments/{id}/return",
            post(return_assignment),
        )
        .route(
            "/api/equipment/{id}",
            get(get_equipment).put(update_equipment).delete(delete_equipment),
        )
}

fn check_status(status: Option<&str>) -> ApiResult<()> {
    match status {
        Some(s) if !EQUIPMENT_STATUSES.contains(&s) => {
            Err(ApiError::bad_request(format!("Invalid status: {}", s)))
        }
        _ => Ok(()),
    }
}

fn check_usage_hours(hours: Option<f64>) -> ApiResult<()> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(ApiError::bad_request(
            "total_usage_hours must be zero or greater",
        )),
        _ => Ok(()),
    }
}

fn already_assigned() -> ApiError {
    ApiError::Conflict("Equipment already has an active assignment".to_string())
}

/// GET /api/equipment?type=&status=&owned=&search=
async fn list_equipment(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<EquipmentFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (items, total) = EquipmentStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list equipment: {:#}", e);
            ApiError::from(e)
        })?;

    Ok(Json(page.envelope(items, total)))
}

/// POST /api/equipment
async fn create_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewEquipment>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("equipment.create")?;
    let kind = required(payload.kind.as_deref(), "type")?;
    let name = required(payload.name.as_deref(), "name")?;
    check_status(payload.status.as_deref())?;

    let created = EquipmentStore::new(&state.db)
        .create(name, kind, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::Conflict("Equipment with this inventory number already exists".to_string())
            }
            other => other,
        })?;

    tracing::info!("🔥 Created equipment {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/equipment/{id}
async fn get_equipment(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let item = EquipmentStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Equipment not found"))?;
    Ok(Json(json!(item)))
}

/// PUT /api/equipment/{id}
async fn update_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<EquipmentUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("equipment.update")?;
    check_status(payload.status.as_deref())?;
    check_usage_hours(payload.total_usage_hours)?;

    let updated = EquipmentStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Equipment not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated equipment {}", id);
    Ok(Json(json!(updated)))
}

/// DELETE /api/equipment/{id}
async fn delete_equipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("equipment.delete")?;

    EquipmentStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Equipment not found"))?;

    tracing::info!("🔥 Deleted equipment {}", id);
    Ok(Json(json!({ "message": "Equipment deleted successfully" })))
}

/// GET /api/equipment/assignments?equipment_id=&project_id=&crew_id=&active_only=
async fn list_assignments(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<AssignmentFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (assignments, total) = EquipmentStore::new(&state.db)
        .assignments(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list equipment assignments: {:#}", e);
            ApiError::from(e)
        })?;

    Ok(Json(page.envelope(assignments, total)))
}

/// POST /api/equipment/assignments
async fn create_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewAssignment>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("equipment.update")?;
    let equipment_id = payload
        .equipment_id
        .ok_or_else(|| ApiError::bad_request("equipment_id is required"))?;
    if payload.project_id.is_none() && payload.crew_id.is_none() && payload.user_id.is_none() {
        return Err(ApiError::bad_request(
            "One of project_id, crew_id or user_id is required",
        ));
    }
    if let (Some(from), Some(to)) = (payload.from_ts, payload.to_ts) {
        if to < from {
            return Err(ApiError::bad_request("to_ts must not be before from_ts"));
        }
    }

    let store = EquipmentStore::new(&state.db);
    store
        .get(equipment_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Equipment not found"))?;
    if store.has_active_assignment(equipment_id).await? {
        return Err(already_assigned());
    }

    // the partial unique index settles concurrent requests that both passed the check
    let assignment = store
        .assign(equipment_id, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => already_assigned(),
            other => other,
        })?;

    tracing::info!("🔥 Assigned equipment {} ({})", equipment_id, assignment.id);
    Ok((StatusCode::CREATED, Json(json!(assignment))))
}

/// POST /api/equipment/assignments/{id}/return
async fn return_assignment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("equipment.update")?;

    let assignment = EquipmentStore::new(&state.db)
        .return_assignment(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Assignment not found"))?;

    tracing::info!("🔥 Equipment {} returned", assignment.equipment_id);
    Ok(Json(json!({
        "message": "Equipment returned",
        "assignment": assignment,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_hours_cannot_go_negative() {
        assert!(check_usage_hours(None).is_ok());
        assert!(check_usage_hours(Some(0.0)).is_ok());
        assert!(check_usage_hours(Some(1250.5)).is_ok());
        assert!(check_usage_hours(Some(-1.0)).is_err());
        assert!(check_usage_hours(Some(f64::NAN)).is_err());
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(check_status(Some("available")).is_ok());
        assert!(check_status(Some("lost")).is_err());
    }
}
