//! Unified error types for swcache.
//!
//! Every variant carries a stable code prefix in its display form so log
//! lines and CLI output can be grepped by failure class.

use tokio_rusqlite::rusqlite;

use crate::controller::LifecycleState;

/// Unified error type for the cache controller and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., a non-GET request offered for storage).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A cache generation could not be opened or created.
    #[error("CACHE_OPEN_FAILED: {name}: {reason}")]
    CacheOpen { name: String, reason: String },

    /// A persisted generation was expected but does not exist.
    #[error("NOT_INSTALLED: cache generation {0} does not exist")]
    NotInstalled(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Transport-level network failure (DNS, connect, reset).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response where a success was required (precache).
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// A lifecycle operation was requested from a state that does not allow it.
    #[error("INVALID_STATE: cannot move from {from} to {to}")]
    InvalidTransition { from: LifecycleState, to: LifecycleState },

    /// Registered script is not located under the configured base path.
    #[error("SCOPE_MISMATCH: script {script} is outside base path {base_path}")]
    ScopeMismatch { script: String, base_path: String },

    /// Unknown client id.
    #[error("CLIENT_NOT_FOUND: {0}")]
    ClientNotFound(u64),
}

impl Error {
    /// True for failures of the network collaborator, as opposed to storage
    /// or programming errors.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::FetchTimeout(_) | Error::FetchTooLarge(_) | Error::HttpError(_)
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidInput(format!("malformed stored headers: {err}"))
    }
}
