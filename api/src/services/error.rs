//! Error handling utilities for route handlers

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::frames::InvalidImageError;
use crate::services::auth::AuthError;
use crate::services::store::StoreError;
use crate::services::vision::ModelError;

/// Extension trait for logging errors and converting to StatusCode
pub trait LogErr<T> {
    /// Log error with context and return a custom StatusCode
    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode> {
        self.map_err(|e| {
            tracing::warn!(error = %e, status = status.as_u16(), "{}", context);
            status
        })
    }
}

/// Errors surfaced at the HTTP boundary as `{"detail": "..."}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Too many requests")]
    RateLimited,
    #[error("{0}")]
    NotFound(String),
    #[error("AI analysis unavailable - API key not configured")]
    ModelUnavailable,
    #[error("Report generation failed")]
    ModelCall,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ModelCall => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Lets `LogErr` results flow into handlers returning `ApiError`
impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Request failed").to_string();
        match status {
            StatusCode::BAD_REQUEST => ApiError::BadRequest(reason),
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(reason),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            StatusCode::NOT_FOUND => ApiError::NotFound(reason),
            _ => ApiError::Internal(reason),
        }
    }
}

impl From<InvalidImageError> for ApiError {
    fn from(e: InvalidImageError) -> Self {
        tracing::debug!(error = %e, "rejected image payload");
        let msg = match e {
            InvalidImageError::Base64 | InvalidImageError::Empty => "Invalid image data",
            _ => "Invalid image file",
        };
        ApiError::BadRequest(msg.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NotConfigured => ApiError::Internal(e.to_string()),
            AuthError::Provider(ref detail) => {
                tracing::error!(error = %detail, "identity provider lookup failed");
                ApiError::Unauthorized(AuthError::Invalid.to_string())
            }
            _ => ApiError::Unauthorized(e.to_string()),
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Unavailable => ApiError::ModelUnavailable,
            ModelError::Call(detail) => {
                tracing::error!(error = %detail, "model call failed");
                ApiError::ModelCall
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "record store failure");
        ApiError::Internal("Database error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_errors_map_to_statuses() {
        assert_eq!(ApiError::from(InvalidImageError::Base64).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(AuthError::Missing).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(AuthError::NotConfigured).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ModelError::Unavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(ModelError::Call("x".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(StoreError::Duplicate("THREAT-1".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_is_not_returned() {
        let err = ApiError::from(AuthError::Provider("upstream said key=abc123".into()));
        assert_eq!(err.to_string(), "Invalid authentication token");

        let err = ApiError::from(ModelError::Call("api key rejected".into()));
        assert_eq!(err.to_string(), "Report generation failed");
    }

    #[test]
    fn log_status_keeps_the_chosen_status() {
        let failed: Result<(), &str> = Err("truncated field");
        let err = ApiError::from(failed.log_status("read", StatusCode::BAD_REQUEST).unwrap_err());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Ok::<u8, &str>(7).log_status("read", StatusCode::BAD_REQUEST), Ok(7));
    }
}
