//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each
//! kind is surfaced to HTTP clients.

use crate::config::ConfigError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kuberstack_core::ports::PortError;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Body of every failed response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub status: bool,
    /// Machine readable kind, e.g. `conflict` or `precondition_failed`.
    pub error: String,
    pub message: String,
}

const GENERIC_FAILURE: &str = "internal server error";

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Port(PortError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Port(PortError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Port(port) => match port {
                PortError::InvalidToken => {
                    (StatusCode::UNAUTHORIZED, "invalid_token", port.to_string())
                }
                PortError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
                PortError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
                }
                PortError::PreconditionFailed(msg) => (
                    StatusCode::PRECONDITION_FAILED,
                    "precondition_failed",
                    msg.clone(),
                ),
                PortError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
                PortError::NotReady(msg) => (StatusCode::NOT_FOUND, "not_ready", msg.clone()),
                PortError::ExternalTool(msg) => {
                    (StatusCode::BAD_GATEWAY, "external_tool_failure", msg.clone())
                }
                PortError::Storage(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage_failure",
                    "session storage is temporarily unavailable, retry later".to_string(),
                ),
                PortError::Unexpected(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    GENERIC_FAILURE.to_string(),
                ),
            },
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                GENERIC_FAILURE.to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                status: false,
                error: kind.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response) -> ErrorBody {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let response = ApiError::from(PortError::InvalidToken).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_of(response).await;
        assert!(!body.status);
        assert_eq!(body.error, "invalid_token");
    }

    #[tokio::test]
    async fn conflict_and_precondition_are_distinct() {
        let conflict = ApiError::from(PortError::Conflict("busy".into())).into_response();
        let precondition =
            ApiError::from(PortError::PreconditionFailed("nodes".into())).into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(precondition.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(body_of(precondition).await.message, "nodes");
    }

    #[tokio::test]
    async fn storage_failure_hides_details() {
        let response =
            ApiError::from(PortError::Storage("disk I/O error at /var/db".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_of(response).await;
        assert!(!body.message.contains("/var/db"));
    }

    #[tokio::test]
    async fn internal_errors_are_generic() {
        let response = ApiError::Internal("stack trace here".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await.message, GENERIC_FAILURE);
    }
}
