/// Dashboard summary endpoint

use crate::{
    api::AppState,
    auth::AuthUser,
    error::{ApiError, ApiResult},
    store::{dashboard::DashboardStats, DashboardStore},
};
use axum::{extract::State, response::Json, routing::get, Router};

pub fn create_dashboard_routes() -> Router<AppState> {
    Router::new().route("/api/dashboard/stats", get(dashboard_stats))
}

/// GET /api/dashboard/stats
async fn dashboard_stats(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<DashboardStats>> {
    let stats = DashboardStore::new(&state.db).stats().await.map_err(|e| {
        tracing::error!("Failed to load dashboard statistics: {:#}", e);
        ApiError::from(e)
    })?;
    Ok(Json(stats))
}
