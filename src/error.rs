use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::{models::EventId, storage::StorageError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unauthorized { message } => ServiceError::Unauthorized(message),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

/// Failures surfaced by the client-side engine in [`crate::live`].
///
/// Only [`SyncError::SessionInvalid`] is fatal to the session; everything else is recoverable
/// in place.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The durable backend refused or failed the operation.
    #[error("persistence failed")]
    Persistence(#[source] StorageError),
    /// The mutation target no longer exists; the local copy is stale.
    #[error("event {0} no longer exists")]
    NotFound(EventId),
    /// The acting identity lost its session. Abort, reload, do not retry.
    #[error("editor session is no longer valid")]
    SessionInvalid,
    /// The change feed is gone; state may be stale until it resubscribes.
    #[error("change feed disconnected: {0}")]
    ChannelDisconnected(String),
    /// The backend did not answer in time.
    #[error("backend did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

impl SyncError {
    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::SessionInvalid)
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unauthorized { .. } => SyncError::SessionInvalid,
            StorageError::Disconnected { message } => SyncError::ChannelDisconnected(message),
            other => SyncError::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_backend_sessions_become_fatal() {
        let err = SyncError::from(StorageError::Unauthorized {
            message: "revoked".into(),
        });
        assert!(matches!(err, SyncError::SessionInvalid));
        assert!(!err.is_retryable());
    }

    #[test]
    fn service_errors_map_to_http_statuses() {
        let response = AppError::from(ServiceError::Degraded).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = AppError::from(ServiceError::NotFound("event".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
