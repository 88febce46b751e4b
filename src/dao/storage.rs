use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend refused the acting identity (revoked or unknown session).
    #[error("storage rejected the session: {message}")]
    Unauthorized { message: String },
    /// The change feed was closed by the backend or the transport dropped.
    #[error("change feed disconnected: {message}")]
    Disconnected { message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a disconnection error for change feeds.
    pub fn disconnected(message: impl Into<String>) -> Self {
        StorageError::Disconnected {
            message: message.into(),
        }
    }
}
