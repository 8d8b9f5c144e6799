/// Equipment maintenance schedule endpoints

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::{
        maintenance::{
            MaintenanceSchedule, MaintenanceStore, NewSchedule, ScheduleFilter,
            DEFAULT_UPCOMING_DAYS, INTERVAL_TYPES,
        },
        EquipmentStore,
    },
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};

pub fn create_maintenance_routes() -> Router<AppState> {
    Router::new().route(
        "/api/equipment/maintenance-schedules",
        get(list_schedules).post(create_schedule),
    )
}

/// GET /api/equipment/maintenance-schedules?equipment_id=&maintenance_type=&overdue_only=&upcoming_within_days=&active_only=
async fn list_schedules(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<ScheduleFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (schedules, total) = MaintenanceStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list maintenance schedules: {:#}", e);
            ApiError::from(e)
        })?;

    let today = Utc::now().date_naive();
    let window = filter.upcoming_within_days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    let items: Vec<Value> = schedules
        .iter()
        .map(|s: &MaintenanceSchedule| s.to_json(today, window))
        .collect();
    Ok(Json(page.envelope(items, total)))
}

/// POST /api/equipment/maintenance-schedules
async fn create_schedule(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewSchedule>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("equipment.update")?;
    let equipment_id = payload
        .equipment_id
        .ok_or_else(|| ApiError::bad_request("equipment_id is required"))?;
    let maintenance_type = required(payload.maintenance_type.as_deref(), "maintenance_type")?;
    let interval_type = required(payload.interval_type.as_deref(), "interval_type")?;
    if !INTERVAL_TYPES.contains(&interval_type) {
        return Err(ApiError::bad_request(format!(
            "interval_type must be one of: {}",
            INTERVAL_TYPES.join(", ")
        )));
    }
    let interval_value = payload
        .interval_value
        .filter(|v| *v > 0)
        .ok_or_else(|| ApiError::bad_request("interval_value must be greater than 0"))?;

    EquipmentStore::new(&state.db)
        .get(equipment_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Equipment not found"))?;

    let created = MaintenanceStore::new(&state.db)
        .create(equipment_id, maintenance_type, interval_type, interval_value, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict(
                "A schedule for this maintenance type already exists".to_string(),
            ),
            other => other,
        })?;

    tracing::info!(
        "🔥 Scheduled {} for equipment {} every {} ({})",
        created.maintenance_type,
        equipment_id,
        interval_value,
        interval_type
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "schedule": created.to_json(Utc::now().date_naive(), DEFAULT_UPCOMING_DAYS),
            "message": "Maintenance schedule created",
        })),
    ))
}
