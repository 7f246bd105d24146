//! Configuration for the bundle installer.

use std::path::PathBuf;
use std::time::Duration;

use super::accumulator::DEFAULT_CHUNK_SIZE;

/// Store name used when a request does not name one.
pub const DEFAULT_STORE_NAME: &str = "proj-data";

/// Configuration for the bundle installer.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Directory under which named stores live.
    pub store_dir: PathBuf,

    /// Store name used when a request leaves it out.
    pub default_store_name: String,

    /// Chunk window for payload reads, discards, and file writes.
    pub chunk_size: usize,

    /// Fail a download when no body data arrives for this long.
    ///
    /// `None` waits indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            default_store_name: DEFAULT_STORE_NAME.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_timeout: None,
        }
    }
}

impl InstallerConfig {
    /// Create a new configuration with the given store directory.
    pub fn new(store_dir: PathBuf) -> Self {
        Self {
            store_dir,
            ..Default::default()
        }
    }

    /// Set the default store name.
    pub fn with_default_store_name(mut self, name: impl Into<String>) -> Self {
        self.default_store_name = name.into();
        self
    }

    /// Set the chunk window.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the body idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Per-user data directory for stores, falling back to the system temp dir.
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("projdata")
}
