/// User management endpoints
///
/// PINs are validated on write. The create response is the only place a PIN
/// is ever returned, so a generated one can be handed to the new user. DELETE
/// deactivates the account rather than removing the row.

use crate::{
    api::AppState,
    auth::{generate_pin, is_valid_pin, AuthUser, Role},
    db::Pagination,
    error::{ApiError, ApiResult},
    store::users::{NewUser, User, UserFilter, UserStore, UserUpdate},
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

pub fn create_user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
}

fn check_role(role: Option<&str>) -> ApiResult<()> {
    match role {
        Some(role) if role.parse::<Role>().is_err() => {
            Err(ApiError::bad_request(format!("Invalid role: {}", role)))
        }
        _ => Ok(()),
    }
}

/// Given PIN when well-formed, otherwise a fresh one; the flag marks generated PINs
fn resolve_pin(pin: Option<&str>) -> ApiResult<(String, bool)> {
    match pin {
        Some(pin) if !is_valid_pin(pin) => {
            Err(ApiError::bad_request("PIN code must be 4-6 digits"))
        }
        Some(pin) => Ok((pin.to_string(), false)),
        None => Ok((generate_pin(), true)),
    }
}

/// Created row plus the PIN it was stored with
fn created_body(user: &User, pin: &str, generated: bool) -> Value {
    let mut body = json!(user);
    body["pin_code"] = json!(pin);
    body["pin_generated"] = json!(generated);
    body
}

/// GET /api/users?role=&is_active=&search=&page=&per_page=
async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<UserFilter>,
) -> ApiResult<Json<Value>> {
    let page = pagination.resolve();
    let (users, total) = UserStore::new(&state.db).list(&filter, page).await.map_err(|e| {
        tracing::error!("Failed to list users: {:#}", e);
        ApiError::from(e)
    })?;

    Ok(Json(page.envelope(users, total)))
}

/// POST /api/users
async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    user.require("users.create")?;

    let has_email = payload.email.as_deref().is_some_and(|e| !e.trim().is_empty());
    let has_phone = payload.phone.as_deref().is_some_and(|p| !p.trim().is_empty());
    if !has_email && !has_phone {
        return Err(ApiError::bad_request("Email or phone required"));
    }
    check_role(payload.role.as_deref())?;

    let (pin, generated) = resolve_pin(payload.pin_code.as_deref())?;

    let created = UserStore::new(&state.db)
        .create(&payload, &pin)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::Conflict("User with this email or phone already exists".to_string())
            }
            other => other,
        })?;

    tracing::info!("🔥 Created user {} ({})", created.id, created.role);
    Ok((StatusCode::CREATED, Json(created_body(&created, &pin, generated))))
}

/// GET /api/users/{id}
async fn get_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let found = UserStore::new(&state.db)
        .get(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "User not found"))?;
    Ok(Json(json!(found)))
}

/// PUT /api/users/{id}
async fn update_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdate>,
) -> ApiResult<Json<Value>> {
    user.require("users.update")?;
    check_role(payload.role.as_deref())?;
    if matches!(payload.pin_code.as_deref(), Some(pin) if !is_valid_pin(pin)) {
        return Err(ApiError::bad_request("PIN code must be 4-6 digits"));
    }

    let updated = UserStore::new(&state.db)
        .update(id, payload)
        .await
        .map_err(|e| ApiError::or_not_found(e, "User not found"))?
        .ok_or_else(|| ApiError::bad_request("No fields to update"))?;

    tracing::info!("🔥 Updated user {}", id);
    Ok(Json(json!(updated)))
}

/// DELETE /api/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    user.require("users.delete")?;

    let deactivated = UserStore::new(&state.db)
        .deactivate(id)
        .await
        .map_err(|e| ApiError::or_not_found(e, "User not found"))?;

    tracing::info!("🔥 Deactivated user {}", id);
    Ok(Json(json!({
        "message": "User deactivated successfully",
        "user": deactivated,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: Some("bauleiter@cometa.test".into()),
            phone: None,
            first_name: "Jana".into(),
            last_name: "Weber".into(),
            role: "foreman".into(),
            skills: json!([]),
            is_active: true,
            language_preference: "de".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn missing_pin_is_generated() {
        let (pin, generated) = resolve_pin(None).unwrap();
        assert!(generated);
        assert!(is_valid_pin(&pin));
    }

    #[test]
    fn given_pin_is_kept_and_checked() {
        assert_eq!(resolve_pin(Some("482913")).unwrap(), ("482913".to_string(), false));
        assert!(resolve_pin(Some("12")).is_err());
    }

    #[test]
    fn created_body_hands_out_the_pin() {
        let (pin, generated) = resolve_pin(None).unwrap();
        let body = created_body(&user(), &pin, generated);
        assert_eq!(body["pin_code"], json!(pin));
        assert_eq!(body["pin_generated"], true);
        assert_eq!(body["role"], "foreman");
    }
}
