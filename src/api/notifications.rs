/// In-app notification endpoints and the reminder trigger
///
/// `GET /api/cron/notifications` runs the same reminder pass as the
/// in-process scheduler so an external cron service can drive it instead.

use crate::{
    api::{required, AppState},
    auth::AuthUser,
    db::Pagination,
    error::{ApiError, ApiResult},
    scheduler::reminders,
    store::notifications::{
        NewNotification, Notification, NotificationFilter, NotificationStore, PRIORITIES,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ReadUpdate {
    pub notification_id: Option<Uuid>,
    pub read: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ReadFlag {
    pub read: Option<bool>,
}

pub fn create_notification_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications)
                .post(create_notification)
                .put(set_read_state),
        )
        .route("/api/notifications/mark-all-read", post(mark_all_read))
        .route(
            "/api/notifications/{id}",
            get(get_notification)
                .patch(patch_notification)
                .delete(delete_notification),
        )
        .route("/api/cron/notifications", get(run_reminders))
}

/// GET /api/notifications?user_id=&read=&priority=&created_after=
async fn list_notifications(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<NotificationFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let store = NotificationStore::new(&state.db);
    let (notifications, total) = store.list(&filter, page).await.map_err(|e| {
        tracing::error!("Failed to list notifications: {:#}", e);
        ApiError::from(e)
    })?;
    let summary = store.summary(filter.user_id).await?;

    let items: Vec<Value> = notifications.iter().map(Notification::to_json).collect();
    let mut body = page.envelope(items, total);
    body["summary"] = json!(summary);
    Ok(Json(body))
}

/// POST /api/notifications
async fn create_notification(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<NewNotification>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let title = required(payload.title.as_deref(), "title")?;
    let message = required(payload.message.as_deref(), "message")?;
    if let Some(priority) = payload.priority.as_deref() {
        if !PRIORITIES.contains(&priority) {
            return Err(ApiError::bad_request(format!("Invalid priority: {}", priority)));
        }
    }

    let created = NotificationStore::new(&state.db)
        .create(title, message, &payload)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::BadRequest(_) => ApiError::bad_request("Unknown user"),
            other => other,
        })?;

    tracing::info!("🔔 Created notification {} for {:?}", created.id, created.user_id);
    Ok((StatusCode::CREATED, Json(created.to_json())))
}

/// PUT /api/notifications
/// Body: { "notification_id": "...", "read": true }
async fn set_read_state(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<ReadUpdate>,
) -> ApiResult<Json<Value>> {
    let id = payload
        .notification_id
        .ok_or_else(|| ApiError::bad_request("notification_id is required"))?;
    let read = payload.read.unwrap_or(true);

    let updated = NotificationStore::new(&state.db)
        .set_read(id, read)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Notification not found"))?;
    Ok(Json(updated.to_json()))
}

/// POST /api/notifications/mark-all-read
async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Value>> {
    let updated = NotificationStore::new(&state.db)
        .mark_all_read(user.id())
        .await?;

    tracing::info!("🔔 Marked {} notifications read for {}", updated, user.id());
    Ok(Json(json!({
        "message": "All notifications marked as read",
        "updated_count": updated,
    })))
}

/// GET /api/notifications/{id}
async fn get_notification(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let notification = NotificationStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Notification not found"))?;
    Ok(Json(notification.to_json()))
}

/// PATCH /api/notifications/{id}
/// Body: { "read": true }
async fn patch_notification(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReadFlag>,
) -> ApiResult<Json<Value>> {
    let read = payload.read.unwrap_or(true);

    let updated = NotificationStore::new(&state.db)
        .set_read(id, read)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Notification not found"))?;
    Ok(Json(updated.to_json()))
}

/// DELETE /api/notifications/{id}
async fn delete_notification(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    NotificationStore::new(&state.db)
        .delete(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "Notification not found"))?;

    tracing::info!("🔔 Deleted notification {}", id);
    Ok(Json(json!({ "message": "Notification deleted successfully" })))
}

/// True when no secret is configured or the bearer token matches it
fn cron_authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == secret)
}

/// GET /api/cron/notifications
async fn run_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    if !cron_authorized(&headers, state.config.auth.cron_secret.as_deref()) {
        return Err(ApiError::Unauthorized("Unauthorized".to_string()));
    }

    let report = reminders::run(&state.db).await.map_err(|e| {
        tracing::error!("Reminder run failed: {:#}", e);
        ApiError::Internal(e)
    })?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Created {} notifications", report.totals().created),
        "stats": report,
        "totals": report.totals(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn cron_is_open_without_secret() {
        assert!(cron_authorized(&HeaderMap::new(), None));
        assert!(cron_authorized(&HeaderMap::new(), Some("")));
    }

    #[test]
    fn cron_requires_matching_bearer() {
        assert!(cron_authorized(&bearer("s3cret"), Some("s3cret")));
        assert!(!cron_authorized(&bearer("wrong"), Some("s3cret")));
        assert!(!cron_authorized(&HeaderMap::new(), Some("s3cret")));
    }
}
