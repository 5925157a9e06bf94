//! Error types for the hostsync engine
//!
//! Every error names the operation that failed and, where a file or a remote
//! source is involved, the path or URL it was acting on, so a failure can be
//! diagnosed from the message alone.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for hostsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the hostsync engine
#[derive(Error, Debug)]
pub enum Error {
    /// A single transport attempt failed (timeout, connection error,
    /// non-success status). Retried by the fetcher.
    #[error("transport error fetching {url}: {message}")]
    Transport {
        /// URL that was requested
        url: String,
        /// Underlying failure description
        message: String,
    },

    /// A source exhausted all of its fetch attempts
    #[error("network error: source '{source_name}' ({url}) failed after {attempts} attempt(s): {last}")]
    Network {
        /// Registry name of the source
        source_name: String,
        /// URL of the source
        url: String,
        /// Number of attempts made
        attempts: u32,
        /// The failure of the final attempt
        #[source]
        last: Box<Error>,
    },

    /// The process lacks the rights to touch a file. Never retried.
    #[error("permission denied during {operation} on {}: {message}", path.display())]
    Permission {
        /// Operation that was running
        operation: String,
        /// Target path
        path: PathBuf,
        /// OS error message
        message: String,
    },

    /// Any other filesystem failure
    #[error("I/O error during {operation} on {}: {source}", path.display())]
    Io {
        /// Operation that was running
        operation: String,
        /// Target path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Candidate content failed a structural sanity check (non-fatal)
    #[error("validation warning: {0}")]
    Validation(String),

    /// Restore target does not exist
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Attempted deletion of the original snapshot
    #[error("snapshot '{0}' is protected and cannot be deleted")]
    ProtectedSnapshot(String),

    /// A persisted history record did not match the schema
    #[error("malformed history record #{index}: {reason}")]
    MalformedHistoryRecord {
        /// Position of the record in the persisted list
        index: usize,
        /// Parse failure
        reason: String,
    },

    /// No source registered under this name
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// No managed block registered for this service tag
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transport error for one failed attempt
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O failure, classifying permission problems separately
    pub fn io(operation: impl Into<String>, path: impl AsRef<Path>, source: io::Error) -> Self {
        let operation = operation.into();
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::Permission {
                operation,
                path,
                message: source.to_string(),
            }
        } else {
            Self::Io {
                operation,
                path,
                source,
            }
        }
    }

    /// Create a validation warning
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "snapshot not found" error
    pub fn snapshot_not_found(id: impl Into<String>) -> Self {
        Self::SnapshotNotFound(id.into())
    }

    /// Whether the fetcher should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether this error means the caller needs elevated rights
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
