//! Error types for the bundle installer.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for installer operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// Errors that can occur while installing a bundle.
///
/// Every variant is fatal to the current install attempt. Nothing is retried
/// internally; a caller that wants a retry re-invokes `install`.
#[derive(Debug, Error)]
pub enum InstallError {
    /// A required request parameter was empty. Raised before any I/O.
    #[error("missing parameter: {0} is required")]
    MissingParameter(&'static str),

    /// The archive request failed or returned a non-success status.
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// The compressed stream could not be decoded.
    #[error("decompression failed: {0}")]
    DecompressionError(String),

    /// The archive ended in the middle of a header or payload.
    #[error("unexpected end of archive: needed {needed} bytes, {available} available")]
    UnexpectedEnd { needed: u64, available: u64 },

    /// A directory or file operation on the store failed.
    #[error("store I/O failed at {}: {source}", path.display())]
    StoreIo { path: PathBuf, source: io::Error },

    /// The channel carrying requests or results to the caller broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// No body data arrived within the configured idle timeout.
    #[error("no data from {url} for {idle_secs}s")]
    Timeout { url: String, idle_secs: u64 },

    /// A path could not be placed under the store root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The installed layout cannot be mounted with the negotiated strategy.
    #[error("store must be flat for file-list mounting, found directory {}", path.display())]
    UnsupportedLayout { path: PathBuf },

    /// An error reported by an installer worker on the other side of the bridge.
    #[error("{kind}: {message}")]
    Worker { kind: ErrorKind, message: String },
}

impl InstallError {
    /// Wrap an I/O error raised while touching `path` in the store.
    pub fn store_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::StoreIo {
            path: path.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameter(_) => ErrorKind::MissingParameter,
            Self::FetchFailed { .. } => ErrorKind::FetchFailed,
            Self::DecompressionError(_) => ErrorKind::DecompressionError,
            Self::UnexpectedEnd { .. } => ErrorKind::UnexpectedEnd,
            Self::StoreIo { .. } => ErrorKind::StoreIo,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::UnsupportedLayout { .. } => ErrorKind::UnsupportedLayout,
            Self::Worker { kind, .. } => *kind,
        }
    }
}

/// Flat classification of [`InstallError`], serializable across the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingParameter,
    FetchFailed,
    DecompressionError,
    UnexpectedEnd,
    StoreIo,
    Transport,
    Timeout,
    InvalidPath,
    UnsupportedLayout,
}

impl ErrorKind {
    /// Get a human-readable name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MissingParameter => "missing parameter",
            Self::FetchFailed => "fetch failed",
            Self::DecompressionError => "decompression error",
            Self::UnexpectedEnd => "unexpected end",
            Self::StoreIo => "store I/O error",
            Self::Transport => "transport error",
            Self::Timeout => "timeout",
            Self::InvalidPath => "invalid path",
            Self::UnsupportedLayout => "unsupported layout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
