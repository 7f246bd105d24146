//! Version marker for an installed store.
//!
//! The marker is one UTF-8 text file in the store root holding the version
//! string of the bundle that was last installed completely. It is written
//! only after extraction succeeds, so its presence vouches for the tree.

use tokio::fs;
use tracing::warn;

use super::error::InstallResult;
use super::store::DirectoryStore;

/// Marker file name under the store root.
pub const VERSION_MARKER: &str = ".projdata-version";

/// Reads and writes the installed-version marker of one store.
#[derive(Debug, Clone, Copy)]
pub struct VersionLedger<'a> {
    store: &'a DirectoryStore,
}

impl<'a> VersionLedger<'a> {
    pub fn new(store: &'a DirectoryStore) -> Self {
        Self { store }
    }

    /// Read the installed version, trimmed.
    ///
    /// Returns `None` when no marker exists. A marker that exists but cannot
    /// be read is logged and also treated as absent, which forces a reinstall.
    pub async fn read(&self) -> Option<String> {
        let path = self.store.root().join(VERSION_MARKER);
        match fs::read(&path).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Unreadable version marker, treating as absent"
                );
                None
            }
        }
    }

    /// Record `version` exactly as given.
    pub async fn write(&self, version: &str) -> InstallResult<()> {
        self.store
            .write_file(VERSION_MARKER, version.as_bytes())
            .await
    }

    /// Whether the store holds exactly `version`, ignoring surrounding whitespace.
    pub async fn is_current(&self, version: &str) -> bool {
        self.read().await.as_deref() == Some(version.trim())
    }
}
