/// GeoJSON feature endpoints used by the map view

use crate::{
    api::AppState,
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    store::geospatial::{GeoFilter, GeoStore, NewGeoFeature, DEFAULT_PER_PAGE},
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

pub fn create_geospatial_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/geospatial/features",
            get(list_features).post(create_feature),
        )
        .route(
            "/api/geospatial/features/{id}",
            get(get_feature).delete(delete_feature),
        )
}

/// GET /api/geospatial/features?project_id=&entity_type=&entity_id=&geometry_type=
async fn list_features(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<GeoFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve_with_default(DEFAULT_PER_PAGE);
    let (features, total) = GeoStore::new(&state.db)
        .list(&filter, page)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list geospatial features: {:#}", e);
            ApiError::from(e)
        })?;

    Ok(Json(page.envelope(features, total)))
}

/// POST /api/geospatial/features
async fn create_feature(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewGeoFeature>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("projects.update")?;
    let valid = payload.validate().map_err(ApiError::BadRequest)?;

    let created = GeoStore::new(&state.db)
        .create(
            valid,
            payload.properties,
            payload.project_id,
            &user.id().to_string(),
        )
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown project"),
            other => other,
        })?;

    tracing::info!(
        "🔥 Stored {} feature for {} {}",
        created.kind,
        created.entity_type,
        created.entity_id
    );
    Ok((StatusCode::CREATED, Json(json!(created))))
}

/// GET /api/geospatial/features/{id}
async fn get_feature(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let feature = GeoStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Feature not found"))?;
    Ok(Json(json!(feature)))
}

/// DELETE /api/geospatial/features/{id}
async fn delete_feature(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("projects.update")?;

    GeoStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Feature not found"))?;

    tracing::info!("🔥 Deleted geospatial feature {}", id);
    Ok(Json(json!({ "message": "Feature deleted successfully" })))
}
