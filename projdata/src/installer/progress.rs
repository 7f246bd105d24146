//! Installation stages and progress reporting.
//!
//! Counters live in a shared [`ProgressTracker`] so both the network stream
//! (bytes received) and the extraction loop (entries written) can report.
//! Each update invokes the caller's callback synchronously on the install
//! task, so callbacks must return quickly and must not block.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Progress callback for install operations.
///
/// Called after every network chunk and every written entry.
pub type ProgressCallback = Box<dyn Fn(ProgressReport) + Send + Sync>;

/// States of one install operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStage {
    Idle,
    /// Comparing the marker against the requested version.
    CheckingVersion,
    /// Marker matched; nothing else was touched.
    Cached,
    /// Wiping the store root.
    Clearing,
    /// Requesting the archive.
    Fetching,
    /// Streaming entries into the store.
    Extracting,
    /// Writing the version marker.
    UpdatingVersion,
    /// Install completed.
    Installed,
    /// Install aborted.
    Failed,
}

impl InstallStage {
    /// Get a human-readable name for the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::CheckingVersion => "Checking version",
            Self::Cached => "Cached",
            Self::Clearing => "Clearing",
            Self::Fetching => "Fetching",
            Self::Extracting => "Extracting",
            Self::UpdatingVersion => "Updating version",
            Self::Installed => "Installed",
            Self::Failed => "Failed",
        }
    }

    /// Whether no further transition can follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cached | Self::Installed | Self::Failed)
    }
}

/// Point-in-time progress of an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub stage: InstallStage,
    /// Compressed bytes received from the network so far.
    pub bytes_consumed: u64,
    /// Expected compressed size, when the server announced one.
    pub total_bytes: Option<u64>,
    /// Files and directories written to the store so far.
    pub entries_written: u64,
}

impl ProgressReport {
    /// Fraction complete in `0.0..=1.0`, if the total is known.
    pub fn ratio(&self) -> Option<f64> {
        self.total_bytes
            .filter(|&total| total > 0)
            .map(|total| (self.bytes_consumed as f64 / total as f64).min(1.0))
    }
}

/// Shared counters for one install.
pub struct ProgressTracker {
    bytes: AtomicU64,
    entries: AtomicU64,
    total: Option<u64>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>, callback: Option<ProgressCallback>) -> Self {
        Self {
            bytes: AtomicU64::new(0),
            entries: AtomicU64::new(0),
            total,
            callback,
        }
    }

    /// Record `n` bytes received and report.
    pub fn record_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::SeqCst);
        self.emit();
    }

    /// Record one written entry and report.
    pub fn record_entry(&self) {
        self.entries.fetch_add(1, Ordering::SeqCst);
        self.emit();
    }

    pub fn snapshot(&self) -> ProgressReport {
        ProgressReport {
            stage: InstallStage::Extracting,
            bytes_consumed: self.bytes.load(Ordering::SeqCst),
            total_bytes: self.total,
            entries_written: self.entries.load(Ordering::SeqCst),
        }
    }

    fn emit(&self) {
        if let Some(ref cb) = self.callback {
            cb(self.snapshot());
        }
    }
}
