//! Messages exchanged between an [`InstallerClient`](super::InstallerClient)
//! and the installer worker.
//!
//! The protocol is closed: every message is one of the variants below,
//! tagged on `type` when serialized. Each carries the correlation id of the
//! request it belongs to.

use serde::{Deserialize, Serialize};

use crate::installer::{ErrorKind, InstallError, InstallOutcome, InstallRequest, ProgressReport};

/// Correlation id assigned by the client.
pub type RequestId = u64;

/// Client to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Install { id: RequestId, request: InstallRequest },
}

impl WorkerRequest {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Install { id, .. } => *id,
        }
    }
}

/// Worker to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Intermediate progress. Zero or more precede the final message.
    Progress { id: RequestId, report: ProgressReport },
    /// The install finished.
    Ready { id: RequestId, outcome: InstallOutcome },
    /// The install failed.
    Error { id: RequestId, error: WorkerError },
}

impl WorkerMessage {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Progress { id, .. } | Self::Ready { id, .. } | Self::Error { id, .. } => *id,
        }
    }

    /// Whether this message completes its request.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// An install error flattened for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&InstallError> for WorkerError {
    fn from(err: &InstallError) -> Self {
        let message = match err {
            InstallError::Worker { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            kind: err.kind(),
            message,
        }
    }
}

impl From<WorkerError> for InstallError {
    fn from(err: WorkerError) -> Self {
        InstallError::Worker {
            kind: err.kind,
            message: err.message,
        }
    }
}
