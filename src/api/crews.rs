/// Crew and crew membership endpoints

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::{
        crews::{
            crew_summary, team_summary, CrewDetail, CrewFilter, CrewMember, CrewStore, CrewUpdate,
            NewCrew, NewTeam,
        },
        ProjectStore,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct NewMember {
    pub user_id: Option<Uuid>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemberQuery {
    pub user_id: Option<Uuid>,
}

pub fn create_crew_routes() -> Router<AppState> {
    Router::new()
        .route("/api/crews", get(list_crews).post(create_crew))
        .route(
            "/api/crews/{id}",
            get(get_crew).put(update_crew).delete(delete_crew),
        )
        .route(
            "/api/crews/{id}/members",
            get(list_members).post(add_member).delete(remove_member),
        )
        .route(
            "/api/projects/{id}/team",
            get(project_team).post(create_project_team),
        )
}

/// GET /api/crews?search=&status=&project_id=
async fn list_crews(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<CrewFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (crews, total) = CrewStore::new(&state.db).list(&filter, page).await.map_err(|e| {
        tracing::error!("Failed to list crews: {:#}", e);
        ApiError::from(e)
    })?;

    let items: Vec<Value> = crews.iter().map(CrewDetail::to_json).collect();
    let mut body = page.envelope(items, total);
    body["summary"] = crew_summary(total, &crews);
    Ok(Json(body))
}

/// POST /api/crews
async fn create_crew(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewCrew>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("teams.create")?;
    let name = required(payload.name.as_deref(), "name")?;

    let created = CrewStore::new(&state.db).create(name, &payload).await?;

    tracing::info!("🔥 Created crew {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/crews/{id}
async fn get_crew(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let crew = CrewStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Crew not found"))?;
    Ok(Json(crew.to_json()))
}

/// PUT /api/crews/{id}
async fn update_crew(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CrewUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("teams.update")?;

    let updated = CrewStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Crew not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated crew {}", id);
    Ok(Json(json!(updated)))
}

/// DELETE /api/crews/{id}
async fn delete_crew(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("teams.delete")?;

    CrewStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Crew not found"))?;

    tracing::info!("🔥 Deleted crew {}", id);
    Ok(Json(json!({ "message": "Crew deleted successfully" })))
}

/// GET /api/crews/{id}/members
async fn list_members(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let members = CrewStore::new(&state.db).members(id).await?;
    let items: Vec<Value> = members.iter().map(CrewMember::to_json).collect();
    Ok(Json(json!(items)))
}

/// POST /api/crews/{id}/members
/// Body: { "user_id": "...", "role": "member" }
async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewMember>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("teams.update")?;
    let user_id = payload
        .user_id
        .ok_or_else(|| ApiError::bad_request("user_id is required"))?;
    let role = payload.role.as_deref().unwrap_or("member");

    let store = CrewStore::new(&state.db);
    if store.is_member(id, user_id).await? {
        return Err(ApiError::Conflict("User is already a member of this crew".to_string()));
    }

    let member = store
        .add_member(id, user_id, role)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown crew or user"),
            other => other,
        })?;

    tracing::info!("🔥 Added {} to crew {} as {}", user_id, id, role);
    Ok((StatusCode::CREATED, Json(member.to_json())))
}

/// DELETE /api/crews/{id}/members?user_id=
async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<MemberQuery>,
) -> ApiResult<Json<Value>> {
    user.require("teams.update")?;
    let user_id = query
        .user_id
        .ok_or_else(|| ApiError::bad_request("user_id is required"))?;

    CrewStore::new(&state.db)
        .remove_member(id, user_id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Crew member not found"))?;

    tracing::info!("🔥 Removed {} from crew {}", user_id, id);
    Ok(Json(json!({ "message": "Member removed successfully" })))
}

/// GET /api/projects/{id}/team
async fn project_team(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let crews = CrewStore::new(&state.db).project_team(id).await.map_err(|e| {
        tracing::error!("Failed to load team of project {}: {:#}", id, e);
        ApiError::from(e)
    })?;

    let summary = team_summary(&crews);
    Ok(Json(json!({
        "project_id": id,
        "crews": crews.iter().map(CrewDetail::to_json).collect::<Vec<_>>(),
        "total_members": summary["total_members"],
        "active_crews": crews.iter().filter(|c| c.crew.status == "active").count(),
        "summary": summary,
    })))
}

/// POST /api/projects/{id}/team
/// Body: { "crew_name": "...", "leader_user_id": "...", "member_user_ids": [...] }
async fn create_project_team(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewTeam>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("teams.create")?;
    let crew_name = required(payload.crew_name.as_deref(), "crew_name")?;

    ProjectStore::new(&state.db)
        .get_plain(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Project not found"))?;

    let crew = CrewStore::new(&state.db)
        .create_team(id, crew_name, payload.leader_user_id, &payload.member_user_ids)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown leader or member user"),
            other => other,
        })?;

    tracing::info!(
        "🔥 Created crew {} on project {} with {} members",
        crew.crew.id,
        id,
        crew.member_count()
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "crew": crew.to_json(),
            "message": "Team created successfully",
        })),
    ))
}
