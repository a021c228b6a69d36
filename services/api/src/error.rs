//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each
//! variant is rendered as an HTTP response.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use flashcard_core::{GenerationError, PortError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents a request-level failure of the generation pipeline.
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request body was not the expected JSON shape.
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    /// The caller sent too many generation requests in the short-term window.
    #[error("Too many generation requests")]
    RateLimited,

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

impl ApiError {
    /// The HTTP status and the caller-safe message for this error.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Generation(GenerationError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, message.clone())
            }
            ApiError::InvalidBody(rejection) => (StatusCode::BAD_REQUEST, rejection.body_text()),
            ApiError::Generation(GenerationError::QuotaExceeded { used, limit, .. }) => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Daily limit reached: {used} of {limit} sentences used today."),
            ),
            ApiError::Generation(GenerationError::ServiceUnavailable { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "The translation service is currently unavailable.".to_string(),
            ),
            ApiError::Generation(GenerationError::Persistence(PortError::NotFound(_)))
            | ApiError::Port(PortError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "Not found.".to_string())
            }
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many generation requests; try again shortly.".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred.".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let session_id = match &self {
            ApiError::Generation(GenerationError::ServiceUnavailable { session_id }) => {
                Some(*session_id)
            }
            _ => None,
        };
        let body = ErrorBody {
            error: message,
            session_id,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn generation_errors_map_to_their_status_codes() {
        assert_eq!(
            status_of(GenerationError::Validation("bad count".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                GenerationError::QuotaExceeded {
                    used: 98,
                    requested: 5,
                    limit: 100
                }
                .into()
            ),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(
                GenerationError::ServiceUnavailable {
                    session_id: Uuid::new_v4()
                }
                .into()
            ),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(GenerationError::Persistence(PortError::Unexpected("disk".to_string())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(ApiError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status_of(PortError::NotFound("session".to_string()).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internal_details_stay_out_of_the_body() {
        let err: ApiError =
            GenerationError::Persistence(PortError::Unexpected("password=hunter2".to_string())).into();
        let (_, message) = err.status_and_message();
        assert!(!message.contains("hunter2"));
    }
}
