//! Request authentication
//!
//! `AuthUser` pulls the access token from `Authorization: Bearer …` or from the
//! `auth-token` cookie and verifies it. Handlers take it as an argument to
//! require a session, then call `require` for role checks.

use crate::{
    api::AppState,
    auth::{
        permissions::{permissions_for, Role},
        tokens::verify_access_token,
        Claims,
    },
    error::ApiError,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

pub const AUTH_COOKIE: &str = "auth-token";

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.claims.user_id
    }

    pub fn role(&self) -> &str {
        &self.claims.role
    }

    pub fn permissions(&self) -> Vec<&'static str> {
        permissions_for(&self.claims.role)
    }

    /// Fail with 403 unless the caller's role grants `permission`
    pub fn require(&self, permission: &str) -> Result<(), ApiError> {
        let granted = self
            .claims
            .role
            .parse::<Role>()
            .is_ok_and(|role| role.has_permission(permission));
        if granted {
            Ok(())
        } else {
            tracing::warn!(
                "⛔ {} ({}) lacks permission {}",
                self.claims.user_id,
                self.claims.role,
                permission
            );
            Err(ApiError::Forbidden(format!("Missing permission: {}", permission)))
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        let claims = verify_access_token(&state.config.auth.jwt_secret, &token).map_err(|e| {
            tracing::debug!("🔒 Rejected token: {}", e);
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        Ok(Self { claims })
    }
}

/// Bearer header wins over the cookie
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == AUTH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value carrying a fresh token
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        AUTH_COOKIE, token, max_age_secs
    )
}

/// `Set-Cookie` value that removes the token
pub fn cleared_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", AUTH_COOKIE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/projects");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn reads_bearer_header() {
        let p = parts(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(token_from_parts(&p).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn reads_cookie_among_others() {
        let p = parts(&[("cookie", "theme=dark; auth-token=tok123; lang=de")]);
        assert_eq!(token_from_parts(&p).as_deref(), Some("tok123"));
    }

    #[test]
    fn header_takes_precedence_over_cookie() {
        let p = parts(&[("authorization", "Bearer fromheader"), ("cookie", "auth-token=fromcookie")]);
        assert_eq!(token_from_parts(&p).as_deref(), Some("fromheader"));
    }

    #[test]
    fn missing_token_yields_none() {
        let p = parts(&[("cookie", "auth-token=")]);
        assert!(token_from_parts(&p).is_none());
    }

    #[test]
    fn cookies_carry_max_age() {
        assert!(session_cookie("t", 28800).contains("Max-Age=28800"));
        assert!(cleared_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn require_checks_role_table() {
        let user = AuthUser {
            claims: Claims {
                user_id: Uuid::new_v4(),
                email: None,
                role: "foreman".into(),
                exp: 0,
            },
        };
        assert!(user.require("work_entries.create").is_ok());
        assert!(user.require("projects.delete").is_err());
    }
}
