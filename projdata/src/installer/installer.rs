//! Bundle installer orchestrating a full install.
//!
//! This module drives one install through its states:
//! 1. Check the version marker; stop if it already matches
//! 2. Wipe the store root
//! 3. Fetch the archive
//! 4. Decompress and extract entries into the store, one at a time
//! 5. Write the version marker
//!
//! The marker is written last. A failed install leaves it absent (the store
//! was cleared first), so the next attempt starts over from a wipe.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::accumulator::ByteAccumulator;
use super::archive::{ArchiveReader, EntryKind};
use super::config::InstallerConfig;
use super::error::{InstallError, InstallResult};
use super::fetch::{with_idle_timeout, ArchiveFetcher};
use super::gzip::gunzip;
use super::ledger::{VersionLedger, VERSION_MARKER};
use super::progress::{InstallStage, ProgressCallback, ProgressTracker};
use super::store::DirectoryStore;

/// What to install and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Location of the gzip-compressed archive.
    pub url: String,
    /// Version string recorded in the marker.
    pub version: String,
    /// Store to install into. Defaults to the configured store name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
}

impl InstallRequest {
    pub fn new(url: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: version.into(),
            store_name: None,
        }
    }

    /// Set the store name (builder pattern).
    pub fn with_store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = Some(name.into());
        self
    }

    fn validate(&self) -> InstallResult<()> {
        if self.url.trim().is_empty() {
            return Err(InstallError::MissingParameter("url"));
        }
        if self.version.trim().is_empty() {
            return Err(InstallError::MissingParameter("version"));
        }
        Ok(())
    }
}

/// How an install finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// The store already held the requested version.
    Cached,
    /// The bundle was downloaded and extracted.
    Installed,
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOutcome {
    pub status: InstallStatus,
    pub version: String,
    /// Root directory of the store.
    pub store_root: PathBuf,
    /// Compressed bytes downloaded.
    pub bytes_downloaded: u64,
    /// Files and directories written.
    pub entries_written: u64,
    /// Entries skipped because their path was unsafe.
    pub entries_skipped: u64,
}

/// Tracks the install state and rejects impossible transitions.
struct StateMachine {
    stage: InstallStage,
}

impl StateMachine {
    fn new() -> Self {
        Self {
            stage: InstallStage::Idle,
        }
    }

    fn stage(&self) -> InstallStage {
        self.stage
    }

    fn advance(&mut self, next: InstallStage) {
        debug_assert!(
            can_advance(self.stage, next),
            "invalid install transition {:?} -> {:?}",
            self.stage,
            next
        );
        debug!(from = self.stage.name(), to = next.name(), "Install state");
        self.stage = next;
    }
}

/// Allowed transitions of the install state machine.
fn can_advance(from: InstallStage, to: InstallStage) -> bool {
    use InstallStage::*;

    match (from, to) {
        (Idle, CheckingVersion)
        | (CheckingVersion, Cached)
        | (CheckingVersion, Clearing)
        | (Clearing, Fetching)
        | (Fetching, Extracting)
        | (Extracting, UpdatingVersion)
        | (UpdatingVersion, Installed) => true,
        (from, Failed) => !from.is_terminal(),
        _ => false,
    }
}

/// Bundle installer.
///
/// Holds no lock: callers must not run two installs against the same store
/// at once. The worker bridge serializes requests for shared use.
pub struct BundleInstaller<F: ArchiveFetcher> {
    fetcher: F,
    config: InstallerConfig,
}

impl<F: ArchiveFetcher> BundleInstaller<F> {
    /// Create a new installer.
    pub fn new(fetcher: F, config: InstallerConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Open a store by name, or the default store.
    pub async fn open_store(&self, name: Option<&str>) -> InstallResult<DirectoryStore> {
        let name = name.unwrap_or(&self.config.default_store_name);
        DirectoryStore::open(&self.config.store_dir, name).await
    }

    /// Install the requested bundle version unless it is already present.
    ///
    /// `on_progress` is called from this task after every network chunk and
    /// every written entry.
    pub async fn install(
        &self,
        request: &InstallRequest,
        on_progress: Option<ProgressCallback>,
    ) -> InstallResult<InstallOutcome> {
        request.validate()?;

        let mut machine = StateMachine::new();
        match self.run(request, on_progress, &mut machine).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(
                    stage = machine.stage().name(),
                    url = %request.url,
                    version = %request.version,
                    error = %e,
                    "Install failed"
                );
                machine.advance(InstallStage::Failed);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &InstallRequest,
        on_progress: Option<ProgressCallback>,
        machine: &mut StateMachine,
    ) -> InstallResult<InstallOutcome> {
        machine.advance(InstallStage::CheckingVersion);
        let store = self.open_store(request.store_name.as_deref()).await?;
        let ledger = VersionLedger::new(&store);

        if ledger.is_current(&request.version).await {
            machine.advance(InstallStage::Cached);
            info!(
                version = %request.version,
                root = %store.root().display(),
                "Bundle already installed"
            );
            return Ok(InstallOutcome {
                status: InstallStatus::Cached,
                version: request.version.clone(),
                store_root: store.root().to_path_buf(),
                bytes_downloaded: 0,
                entries_written: 0,
                entries_skipped: 0,
            });
        }

        info!(
            url = %request.url,
            version = %request.version,
            root = %store.root().display(),
            "Installing bundle"
        );

        machine.advance(InstallStage::Clearing);
        store.clear().await?;

        machine.advance(InstallStage::Fetching);
        let fetched = self.fetcher.fetch(&request.url).await?;

        machine.advance(InstallStage::Extracting);
        let tracker = Arc::new(ProgressTracker::new(fetched.content_length, on_progress));

        let body = match self.config.idle_timeout {
            Some(idle) => with_idle_timeout(fetched.body, idle, request.url.clone()),
            None => fetched.body,
        };
        let counter = Arc::clone(&tracker);
        let body = body.inspect_ok(move |chunk| counter.record_bytes(chunk.len() as u64));

        let input = ByteAccumulator::with_chunk_size(gunzip(body), self.config.chunk_size);
        let mut reader = ArchiveReader::new(input);
        let reserved = extract_entries(&mut reader, &store, &tracker).await?;
        let skipped = reader.skipped() + reserved;

        machine.advance(InstallStage::UpdatingVersion);
        ledger.write(&request.version).await?;

        machine.advance(InstallStage::Installed);
        let report = tracker.snapshot();
        info!(
            version = %request.version,
            entries = report.entries_written,
            skipped,
            bytes = report.bytes_consumed,
            "Bundle installed"
        );

        Ok(InstallOutcome {
            status: InstallStatus::Installed,
            version: request.version.clone(),
            store_root: store.root().to_path_buf(),
            bytes_downloaded: report.bytes_consumed,
            entries_written: report.entries_written,
            entries_skipped: skipped,
        })
    }
}

/// Whether an archive path would land on the version marker.
fn is_reserved_path(path: &str) -> bool {
    let mut segments = path.split('/').filter(|s| !s.is_empty() && *s != ".");
    matches!(
        (segments.next(), segments.next()),
        (Some(VERSION_MARKER), None)
    )
}

/// Drain the reader entry by entry into the store.
///
/// Returns the number of entries skipped because they named the version
/// marker. Only the installer writes the marker.
async fn extract_entries<S>(
    reader: &mut ArchiveReader<S>,
    store: &DirectoryStore,
    tracker: &ProgressTracker,
) -> InstallResult<u64>
where
    S: Stream<Item = InstallResult<Bytes>> + Unpin,
{
    let mut reserved = 0;
    while let Some(entry) = reader.next_entry().await? {
        if is_reserved_path(&entry.path) {
            warn!(path = %entry.path, "Skipping archive entry named like the version marker");
            reserved += 1;
            continue;
        }

        match entry.kind {
            EntryKind::Directory => {
                store.ensure_dir(&entry.path).await?;
            }
            EntryKind::File => {
                let mut file = store.create_file(&entry.path).await?;
                while let Some(chunk) = reader.read_chunk().await? {
                    file.write(&chunk).await?;
                }
                file.close().await?;
            }
        }

        debug!(path = %entry.path, kind = ?entry.kind, size = entry.size, "Wrote entry");
        tracker.record_entry();
    }
    Ok(reserved)
}
