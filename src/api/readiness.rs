/// Project readiness endpoints
///
/// The score itself comes from the `calculate_project_readiness` database
/// function; this layer caches it, adds the open required items and reshapes
/// the result for the dashboard.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    error::{ApiError, ApiResult},
    store::{
        notifications::NewNotification,
        projects::is_valid_status,
        readiness::{days_to_start, Activation, ActivationRequest, ACTIVATION_THRESHOLD},
        NotificationStore, ProjectStore, ReadinessStore,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ChecklistToggle {
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: Option<String>,
}

pub fn create_readiness_routes() -> Router<AppState> {
    Router::new()
        .route("/api/project-readiness/{id}", get(get_readiness))
        .route("/api/project-readiness/{id}/checklist", get(get_checklist))
        .route(
            "/api/project-readiness/{id}/checklist/{item_id}",
            put(toggle_checklist_item),
        )
        .route("/api/project-readiness/{id}/status", put(update_status))
        .route("/api/project-activation", post(activate_project))
}

/// GET /api/project-readiness/{id}
async fn get_readiness(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = ProjectStore::new(&state.db)
        .get_plain(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;

    let store = ReadinessStore::new(&state.db);
    let snapshot = store.calculate(id).await.map_err(|e| {
        tracing::error!("Readiness calculation failed for {}: {:#}", id, e);
        ApiError::from(e)
    })?;
    let open_items = store.open_required_items(id).await?;

    let issues: Vec<Value> = open_items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "title": item.title,
                "category": item.category,
                "severity": "critical",
                "action_required": item.action_required,
            })
        })
        .collect();

    Ok(Json(json!({
        "project_id": id,
        "project_status": project.status,
        "overall_readiness": snapshot.overall_readiness(),
        "total_checks": snapshot.total_checks,
        "completed_checks": snapshot.completed_checks,
        "days_to_start": days_to_start(project.start_date, Utc::now().date_naive()),
        "critical_issues": snapshot.critical_issues(),
        "categories": snapshot.categories_json(),
        "issues": issues,
        "status": snapshot.status(),
    })))
}

/// GET /api/project-readiness/{id}/checklist
async fn get_checklist(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    ProjectStore::new(&state.db)
        .get_plain(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;

    let store = ReadinessStore::new(&state.db);
    let seeded = store.seed_defaults(id).await?;
    if seeded > 0 {
        tracing::info!("📋 Seeded {} checklist items for project {}", seeded, id);
    }

    let items = store.checklist(id).await?;
    Ok(Json(json!(items)))
}

/// PUT /api/project-readiness/{id}/checklist/{item_id}
/// Body: { "completed": true }
async fn toggle_checklist_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ChecklistToggle>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;
    let completed = payload
        .completed
        .ok_or_else(|| ApiError::bad_request("completed is required"))?;

    let item = ReadinessStore::new(&state.db)
        .set_completed(id, item_id, completed)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Checklist item not found"))?;

    tracing::info!("🔥 Checklist item {} of project {} completed={}", item_id, id, completed);
    Ok(Json(json!(item)))
}

/// PUT /api/project-readiness/{id}/status
/// Body: { "status": "active" }
async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusChange>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;
    let status = required(payload.status.as_deref(), "status")?;
    if !is_valid_status(status) {
        return Err(ApiError::bad_request(format!("Invalid status: {}", status)));
    }

    let project = ProjectStore::new(&state.db)
        .set_status(id, status)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;

    tracing::info!("🔥 Project {} moved to {}", id, status);
    Ok(Json(json!({
        "message": "Project status updated",
        "project": project,
    })))
}

/// POST /api/project-activation
/// Body: { "project_id": "...", "activation_date": "2024-06-01", "responsible_manager": "..." }
async fn activate_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ActivationRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("projects.update")?;
    let (Some(project_id), Some(activation_date)) = (payload.project_id, payload.activation_date) else {
        return Err(ApiError::bad_request(
            "project_id, activation_date and responsible_manager are required",
        ));
    };
    let manager = required(payload.responsible_manager.as_deref(), "responsible_manager")?;

    let activation = ReadinessStore::new(&state.db)
        .activate(project_id, activation_date, manager, &payload, user.id())
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;

    let (log, project_name, pm_user_id) = match activation {
        Activation::BelowThreshold { readiness } => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Project does not meet activation requirements",
                    "message": format!(
                        "Project readiness is {}%, minimum required is {}%",
                        readiness, ACTIVATION_THRESHOLD
                    ),
                    "current_readiness": readiness,
                    "required_readiness": ACTIVATION_THRESHOLD,
                })),
            ));
        }
        Activation::Activated {
            log,
            project_name,
            pm_user_id,
        } => (log, project_name, pm_user_id),
    };

    if log.notify_stakeholders {
        if let Some(pm) = pm_user_id {
            let title = format!("Projekt aktiviert: {}", project_name);
            let message = format!(
                "Das Projekt \"{}\" wurde zum {} aktiviert (Verantwortlich: {}).",
                project_name,
                log.activation_date.format("%d.%m.%Y"),
                log.responsible_manager
            );
            let notification = NewNotification {
                user_id: Some(pm),
                title: Some(title.clone()),
                message: Some(message.clone()),
                notification_type: Some("project_activation".to_string()),
                priority: Some("normal".to_string()),
                action_url: Some(format!("/dashboard/projects/{}", project_id)),
                action_label: None,
                data: Some(json!({ "project_id": project_id, "activation_log_id": log.id })),
                expires_at: None,
            };
            if let Err(e) = NotificationStore::new(&state.db)
                .create(&title, &message, &notification)
                .await
            {
                tracing::warn!("⚠️ Project {} activated but PM not notified: {:#}", project_id, e);
            }
        }
    }

    tracing::info!(
        "🔥 Activated project {} at {}% readiness (was {})",
        project_id,
        log.readiness_at_activation,
        log.previous_status
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Project successfully activated on {}", log.activation_date),
            "previous_status": log.previous_status,
            "new_status": log.new_status,
            "readiness_at_activation": log.readiness_at_activation,
            "activation_log": log,
        })),
    ))
}
