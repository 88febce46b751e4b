use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`RemoteStoreError`] failures.
pub type RemoteResult<T> = Result<T, RemoteStoreError>;

/// Failures talking to a remote matchday server.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// Building the HTTP client failed.
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request never got an answer.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with an unexpected status.
    #[error("unexpected response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// The server rejected the editor token.
    #[error("editor token rejected by `{path}`")]
    Unauthorized { path: String },
    /// The response body was not the expected JSON.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The SSE stream broke while reading.
    #[error("event stream interrupted: {message}")]
    Stream { message: String },
}

impl From<RemoteStoreError> for StorageError {
    fn from(err: RemoteStoreError) -> Self {
        match err {
            RemoteStoreError::Unauthorized { .. } => StorageError::Unauthorized {
                message: err.to_string(),
            },
            RemoteStoreError::Stream { .. } => StorageError::disconnected(err.to_string()),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
