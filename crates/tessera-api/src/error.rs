//! Tessera API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tessera_core::error::DomainError;
use tessera_cqrs::{DispatchError, FieldViolation};
use thiserror::Error;
use tracing::error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations could not be applied.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Handlers could not be registered on the buses.
    #[error("wiring error: {0}")]
    Wiring(#[from] DispatchError),

    /// Background work failed to stop cleanly.
    #[error("shutdown error: {0}")]
    Shutdown(#[from] DomainError),

    /// Tracing or span export could not be set up.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Per-field problems, for validation failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldViolation>,
}

/// HTTP-layer wrapper around `DispatchError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(DispatchError::Domain(err))
    }
}

fn status_for(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::ValidationFailed(_) | DispatchError::Domain(DomainError::Validation(_)) => {
            StatusCode::BAD_REQUEST
        }
        DispatchError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        DispatchError::Domain(DomainError::AggregateNotFound(_)) => StatusCode::NOT_FOUND,
        DispatchError::Domain(DomainError::ConcurrencyConflict { .. }) => StatusCode::CONFLICT,
        DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::HandlerNotFound(_)
        | DispatchError::DuplicateRegistration(_)
        | DispatchError::UnexpectedResult(_)
        | DispatchError::Domain(
            DomainError::AggregateStreamCorrupt { .. }
            | DomainError::OutboxAppendConflict(_)
            | DomainError::Infrastructure(_),
        ) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let error_code = self.0.kind();
        if status.is_server_error() {
            error!(error_kind = error_code, error = %self.0, "request failed");
        }

        let message = self.0.to_string();
        let fields = match self.0 {
            DispatchError::ValidationFailed(violations) => violations,
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: error_code,
            message,
            fields,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_aggregate_not_found_maps_to_404() {
        assert_eq!(
            status_of(DomainError::AggregateNotFound("t-1".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_concurrency_conflict_maps_to_409() {
        assert_eq!(
            status_of(DomainError::ConcurrencyConflict {
                stream: "tenant:t-1".into(),
                expected: 1,
                actual: 2,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_domain_validation_maps_to_400() {
        assert_eq!(
            status_of(DomainError::Validation("tenant is deleted".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_permission_denied_maps_to_403() {
        assert_eq!(
            status_of(DispatchError::PermissionDenied {
                message_type: "DeleteTenant".into(),
                reason: "caller is not authenticated".into(),
            }),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_timeout_maps_to_504() {
        assert_eq!(
            status_of(DispatchError::Timeout {
                message_type: "GetTenant".into(),
                after_ms: 30_000,
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_wiring_and_infrastructure_failures_map_to_500() {
        assert_eq!(
            status_of(DispatchError::HandlerNotFound("GetTenant".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(DomainError::Infrastructure("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_outbox_append_conflict_is_a_server_error() {
        // Arrange
        let err = ApiError::from(DomainError::OutboxAppendConflict("m-1".into()));

        // Act
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        // Assert
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "outbox_append_conflict");
    }

    #[tokio::test]
    async fn test_validation_failure_lists_fields_in_body() {
        // Arrange
        let err = ApiError(DispatchError::ValidationFailed(vec![
            FieldViolation::new("name", "must not be blank"),
            FieldViolation::new("plan", "must be one of free, standard, enterprise"),
        ]));

        // Act
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_failed");
        assert_eq!(json["fields"][0]["field"], "name");
        assert_eq!(json["fields"][1]["field"], "plan");
    }

    #[tokio::test]
    async fn test_non_validation_errors_omit_fields() {
        let response = ApiError::from(DomainError::AggregateNotFound("t-1".into())).into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["error"], "aggregate_not_found");
        assert!(json.get("fields").is_none());
    }
}
