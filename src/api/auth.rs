/// PIN login, logout and session introspection
///
/// POST /api/auth/login is the only unauthenticated API route besides the
/// cron trigger. A successful login answers with both tokens and also sets
/// the `auth-token` cookie for the dashboard.

use crate::{
    api::AppState,
    auth::{
        extractor::{cleared_cookie, session_cookie},
        is_valid_pin, issue_tokens, permissions_for, AuthUser,
    },
    error::{ApiError, ApiResult},
    store::UserStore,
};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub pin_code: Option<String>,
    #[serde(default)]
    pub remember_me: bool,
}

impl LoginRequest {
    /// Returns `(email, phone, pin)` with blanks treated as missing
    fn credentials(&self) -> ApiResult<(Option<&str>, Option<&str>, &str)> {
        let email = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let phone = self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
        if email.is_none() && phone.is_none() {
            return Err(ApiError::bad_request("Email or phone required"));
        }

        let pin = self
            .pin_code
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::bad_request("PIN code required"))?;
        if !is_valid_pin(pin) {
            return Err(ApiError::bad_request("Invalid PIN code format"));
        }

        // Email wins when both are given
        let phone = if email.is_some() { None } else { phone };
        Ok((email, phone, pin))
    }
}

pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

/// POST /api/auth/login
/// Body: { "email" | "phone": "...", "pin_code": "1234", "remember_me": false }
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let (email, phone, pin) = payload.credentials()?;

    let user = UserStore::new(&state.db)
        .find_by_credentials(email, phone, pin)
        .await
        .map_err(|e| {
            tracing::error!("Login lookup failed: {:#}", e);
            ApiError::Internal(e)
        })?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    let tokens = issue_tokens(
        &state.config.auth.jwt_secret,
        user.id,
        user.email.clone(),
        &user.role,
        payload.remember_me,
    )?;

    tracing::info!("🔑 {} ({}) signed in", user.id, user.role);

    let cookie = session_cookie(&tokens.access_token, tokens.expires_in);
    let body = json!({
        "message": "Authentication successful",
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "token_type": "bearer",
        "expires_in": tokens.expires_in,
        "user": {
            "id": user.id,
            "email": user.email,
            "phone": user.phone,
            "first_name": user.first_name,
            "last_name": user.last_name,
            "role": user.role,
            "language_preference": user.language_preference,
        },
        "permissions": permissions_for(&user.role),
    });

    Ok(([(header::SET_COOKIE, cookie)], Json(body)))
}

/// POST /api/auth/logout
async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, cleared_cookie())],
        Json(json!({ "message": "Logged out" })),
    )
}

/// GET /api/auth/me
async fn me(user: AuthUser) -> Json<Value> {
    Json(json!({
        "user_id": user.claims.user_id,
        "email": user.claims.email,
        "role": user.claims.role,
        "expires_at": user.claims.exp,
        "permissions": user.permissions(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: Option<&str>, phone: Option<&str>, pin: Option<&str>) -> LoginRequest {
        LoginRequest {
            email: email.map(String::from),
            phone: phone.map(String::from),
            pin_code: pin.map(String::from),
            remember_me: false,
        }
    }

    #[test]
    fn email_or_phone_is_required() {
        let err = request(None, Some(" "), Some("1234")).credentials().unwrap_err();
        assert_eq!(err.to_string(), "Email or phone required");
    }

    #[test]
    fn pin_format_is_checked() {
        assert_eq!(
            request(Some("a@b.de"), None, None).credentials().unwrap_err().to_string(),
            "PIN code required"
        );
        assert_eq!(
            request(Some("a@b.de"), None, Some("12ab")).credentials().unwrap_err().to_string(),
            "Invalid PIN code format"
        );
    }

    #[test]
    fn email_takes_precedence_over_phone() {
        let req = request(Some("a@b.de"), Some("+491701234567"), Some("123456"));
        let (email, phone, pin) = req.credentials().unwrap();
        assert_eq!(email, Some("a@b.de"));
        assert_eq!(phone, None);
        assert_eq!(pin, "123456");
    }
}
