//! Error types for the Crema worker.
//!
//! Every fallible worker operation returns [`WorkerError`]. The proxy runtime
//! maps these onto HTTP status codes with [`WorkerError::to_http_status`].

use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::WorkerState;

/// Main error type for the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Storage errors
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Worker lifecycle errors
    #[error("Install failed while caching {url}: {message}")]
    InstallFailed { url: String, message: String },

    #[error("Invalid worker state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: WorkerState, to: WorkerState },

    #[error("No active worker is controlling clients")]
    NoActiveWorker,

    #[error("No handler registered for {0} events")]
    NoHandler(String),

    // Client window errors
    #[error("Client window error: {message}")]
    Client { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for WorkerError {
    fn from(err: rusqlite::Error) -> Self {
        WorkerError::Storage {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl WorkerError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        WorkerError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a storage error without an underlying database error.
    pub fn storage(message: impl Into<String>) -> Self {
        WorkerError::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error came from the network rather than from storage or logic.
    ///
    /// Network-first fetches fall back to the cache only for these.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, WorkerError::Network { .. } | WorkerError::Timeout(_))
    }

    /// Map to the HTTP status the proxy answers with.
    ///
    /// - 502: upstream unreachable and nothing cached
    /// - 504: upstream timed out
    /// - 503: no active worker (install never succeeded)
    /// - 500: everything else
    pub fn to_http_status(&self) -> u16 {
        match self {
            WorkerError::Network { .. } => 502,
            WorkerError::Timeout(_) => 504,
            WorkerError::NoActiveWorker | WorkerError::InstallFailed { .. } => 503,
            _ => 500,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::Network { .. }
                | WorkerError::Timeout(_)
                | WorkerError::InstallFailed { .. }
        )
    }
}
