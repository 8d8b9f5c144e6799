//! API error type
//!
//! Handlers return `Result<_, ApiError>`; the error renders as
//! `{ "error": "<message>" }` with the matching status code. Internal failures
//! are logged in full and answered with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// Errors surfaced at the HTTP boundary
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

/// Convenient result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a store failure, turning a missing row into a 404 with `what` as message
    pub fn or_not_found(err: anyhow::Error, what: &str) -> Self {
        match Self::from(err) {
            Self::NotFound(_) => Self::NotFound(what.to_string()),
            other => other,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let Some(db_err) = err.downcast_ref::<sqlx::Error>() else {
            return Self::Internal(err);
        };

        match db_err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(inner) => match inner.code().as_deref() {
                Some("23505") => Self::Conflict("Resource already exists".to_string()),
                Some("23503") => Self::BadRequest("Referenced resource does not exist".to_string()),
                Some("23514") | Some("22P02") | Some("23502") => {
                    Self::BadRequest(format!("Invalid value: {}", inner.message()))
                }
                _ => Self::Internal(err),
            },
            _ => Self::Internal(err),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::from(anyhow::Error::new(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(err) => {
                tracing::error!("❌ Request failed: {:#}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_404() {
        let err = ApiError::from(anyhow::Error::new(sqlx::Error::RowNotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn or_not_found_uses_custom_message() {
        let err = ApiError::or_not_found(
            anyhow::Error::new(sqlx::Error::RowNotFound),
            "Project not found",
        );
        assert_eq!(err.to_string(), "Project not found");
    }

    #[test]
    fn non_database_errors_are_internal() {
        let err = ApiError::from(anyhow::anyhow!("storage down"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_error_body_is_redacted() {
        let response = ApiError::from(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
