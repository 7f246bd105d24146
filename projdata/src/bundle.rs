//! Installed bundle handles and mount negotiation.
//!
//! A consumer engine mounts an installed store either as a whole directory
//! tree or, when it cannot, as a flat list of files. The choice is made once
//! from the engine's declared [`EngineCapabilities`] and returned as a typed
//! [`MountPlan`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::installer::{
    ArchiveFetcher, BundleInstaller, DirectoryStore, EntryKind, InstallError, InstallOutcome,
    InstallRequest, InstallResult, InstallStatus, ProgressCallback,
};

/// What the consuming engine can mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// The engine can mount a directory tree directly.
    pub directory_mount: bool,
}

impl Default for EngineCapabilities {
    fn default() -> Self {
        Self::directory()
    }
}

impl EngineCapabilities {
    pub fn directory() -> Self {
        Self {
            directory_mount: true,
        }
    }

    pub fn files_only() -> Self {
        Self {
            directory_mount: false,
        }
    }
}

/// How the engine should mount a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MountPlan {
    /// Mount the store root as a directory.
    Directory { root: PathBuf },
    /// Mount each file individually. Sorted by path.
    Files { files: Vec<PathBuf> },
}

impl MountPlan {
    /// Pick the single mount strategy for the store at `root`.
    ///
    /// Without directory support the store must be flat; a nested directory
    /// fails with [`InstallError::UnsupportedLayout`]. The version marker is
    /// never part of the plan.
    pub fn negotiate(root: &Path, capabilities: EngineCapabilities) -> InstallResult<Self> {
        if capabilities.directory_mount {
            return Ok(Self::Directory {
                root: root.to_path_buf(),
            });
        }

        let entries = DirectoryStore::at(root).list()?;
        if let Some(dir) = entries.iter().find(|e| e.kind == EntryKind::Directory) {
            return Err(InstallError::UnsupportedLayout {
                path: root.join(&dir.path),
            });
        }

        let files: Vec<PathBuf> = entries.into_iter().map(|e| root.join(e.path)).collect();
        debug!(root = %root.display(), files = files.len(), "Negotiated file-list mount");
        Ok(Self::Files { files })
    }
}

/// Handle to an installed bundle, ready to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBundle {
    pub root: PathBuf,
    pub version: String,
    pub status: InstallStatus,
    pub mount: MountPlan,
}

impl DataBundle {
    /// Build the handle for a finished install.
    pub fn from_outcome(
        outcome: InstallOutcome,
        capabilities: EngineCapabilities,
    ) -> InstallResult<Self> {
        let mount = MountPlan::negotiate(&outcome.store_root, capabilities)?;
        Ok(Self {
            root: outcome.store_root,
            version: outcome.version,
            status: outcome.status,
            mount,
        })
    }
}

/// Install `request` if needed and return a mountable handle.
pub async fn ensure_bundle<F: ArchiveFetcher>(
    installer: &BundleInstaller<F>,
    request: &InstallRequest,
    capabilities: EngineCapabilities,
    on_progress: Option<ProgressCallback>,
) -> InstallResult<DataBundle> {
    let outcome = installer.install(request, on_progress).await?;
    let bundle = DataBundle::from_outcome(outcome, capabilities)?;
    info!(
        root = %bundle.root.display(),
        version = %bundle.version,
        status = ?bundle.status,
        "Bundle ready"
    );
    Ok(bundle)
}
