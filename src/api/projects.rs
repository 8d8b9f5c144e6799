/// Project endpoints
///
/// Lists carry computed `budget` and `progress`; the stats route derives the
/// preparation phase from which resources are already attached.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::{
        project_contacts::{ContactQuery, NewProjectContact, ProjectContactStore},
        projects::{
            is_valid_status, NewProject, NewSoilType, ProjectFilter, ProjectOverview, ProjectStore,
            ProjectUpdate,
        },
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub fn create_project_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/api/projects/{id}/stats", get(project_stats))
        .route(
            "/api/projects/{id}/soil-types",
            get(list_soil_types).post(add_soil_type),
        )
        .route(
            "/api/projects/{id}/soil-types/{soil_type_id}",
            delete(delete_soil_type),
        )
        .route(
            "/api/projects/{id}/recalculate-totals",
            post(recalculate_totals),
        )
        .route(
            "/api/projects/{id}/contacts",
            get(list_contacts).post(add_contact).delete(delete_contact),
        )
}

fn check_status(status: Option<&str>) -> ApiResult<()> {
    match status {
        Some(status) if !is_valid_status(status) => {
            Err(ApiError::bad_request(format!("Invalid status: {}", status)))
        }
        _ => Ok(()),
    }
}

/// GET /api/projects?status=&search=&page=&per_page=
async fn list_projects(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<ProjectFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (projects, total) = ProjectStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list projects: {:#}", e);
            ApiError::from(e)
        })?;

    let items: Vec<Value> = projects.iter().map(ProjectOverview::to_json).collect();
    Ok(Json(page.envelope(items, total)))
}

/// POST /api/projects
async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewProject>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("projects.create")?;
    let name = required(payload.name.as_deref(), "name")?;
    check_status(payload.status.as_deref())?;
    if matches!(payload.total_length_m, Some(m) if m < 0.0) {
        return Err(ApiError::bad_request("total_length_m must be zero or greater"));
    }

    let created = ProjectStore::new(&state.db).create(name, &payload).await?;

    tracing::info!("🔥 Created project {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/projects/{id}
async fn get_project(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = ProjectStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;
    Ok(Json(project.to_json()))
}

/// PUT /api/projects/{id}
async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;
    check_status(payload.status.as_deref())?;
    if matches!(payload.name.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(ApiError::bad_request("name must not be empty"));
    }

    let updated = ProjectStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated project {}", id);
    Ok(Json(json!(updated)))
}

/// DELETE /api/projects/{id}
async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("projects.delete")?;

    let (id, name) = ProjectStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;

    tracing::info!("🔥 Deleted project {} ({})", id, name);
    Ok(Json(json!({
        "message": "Project deleted successfully",
        "deleted_project": { "id": id, "name": name },
    })))
}

/// GET /api/projects/{id}/stats
async fn project_stats(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let inputs = ProjectStore::new(&state.db)
        .stats_inputs(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;
    Ok(Json(inputs.to_json()))
}

/// GET /api/projects/{id}/soil-types
async fn list_soil_types(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let soil_types = ProjectStore::new(&state.db).soil_types(id).await?;
    Ok(Json(json!(soil_types)))
}

/// POST /api/projects/{id}/soil-types
async fn add_soil_type(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewSoilType>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("projects.update")?;
    let name = required(payload.soil_type_name.as_deref(), "soil_type_name")?;
    let price = payload
        .price_per_meter
        .ok_or_else(|| ApiError::bad_request("price_per_meter is required"))?;
    if price < 0.0 || matches!(payload.quantity_meters, Some(q) if q < 0.0) {
        return Err(ApiError::bad_request(
            "price_per_meter and quantity_meters must be zero or greater",
        ));
    }

    let created = ProjectStore::new(&state.db)
        .add_soil_type(id, name, price, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::not_found("Project not found"),
            other => other,
        })?;

    tracing::info!("🔥 Added soil type {} to project {}", created.soil_type_name, id);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// DELETE /api/projects/{id}/soil-types/{soil_type_id}
async fn delete_soil_type(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, soil_type_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;

    ProjectStore::new(&state.db)
        .delete_soil_type(id, soil_type_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Soil type not found"))?;

    tracing::info!("🔥 Removed soil type {} from project {}", soil_type_id, id);
    Ok(Json(json!({ "message": "Soil type deleted successfully" })))
}

/// POST /api/projects/{id}/recalculate-totals
async fn recalculate_totals(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;

    let (project, totals) = ProjectStore::new(&state.db)
        .recalculate_totals(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;

    tracing::info!(
        "🔥 Recalculated project {} to {} m over {} soil types",
        id,
        totals.total_length_m,
        totals.soil_types_count
    );
    Ok(Json(json!({
        "success": true,
        "message": "Project totals recalculated",
        "project": project,
        "calculated_totals": totals,
    })))
}

/// GET /api/projects/{id}/contacts
async fn list_contacts(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let contacts = ProjectContactStore::new(&state.db).list(id).await?;
    Ok(Json(json!(contacts)))
}

/// POST /api/projects/{id}/contacts
async fn add_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewProjectContact>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("projects.update")?;
    let first_name = required(payload.first_name.as_deref(), "first_name")?;
    let last_name = required(payload.last_name.as_deref(), "last_name")?;

    let created = ProjectContactStore::new(&state.db)
        .create(id, first_name, last_name, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::not_found("Project not found"),
            other => other,
        })?;

    tracing::info!("🔥 Added contact {} to project {}", created.id, id);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// DELETE /api/projects/{id}/contacts?contact_id=
async fn delete_contact(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ContactQuery>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;
    let contact_id = query
        .contact_id
        .ok_or_else(|| ApiError::bad_request("contact_id is required"))?;

    ProjectContactStore::new(&state.db)
        .delete(id, contact_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Contact not found"))?;

    tracing::info!("🔥 Removed contact {} from project {}", contact_id, id);
    Ok(Json(json!({ "success": true })))
}
