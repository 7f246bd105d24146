//! Versioned bundle installation.
//!
//! A bundle is a gzip-compressed tar archive served over HTTP. Installing it
//! streams the body through decompression and tar parsing straight into a
//! [`DirectoryStore`], without holding the archive in memory. A version
//! marker in the store root makes repeat installs of the same version free.
//!
//! # Pipeline
//!
//! ```text
//! ArchiveFetcher ──► gunzip ──► ByteAccumulator ──► ArchiveReader ──► DirectoryStore
//!   (HTTP body)     (inflate)    (buffered takes)    (tar headers)     (files, dirs)
//!        │                                                 │
//!        └──── bytes ─────► ProgressTracker ◄──── entries ─┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use projdata::installer::{BundleInstaller, HttpFetcher, InstallRequest, InstallerConfig};
//!
//! let installer = BundleInstaller::new(HttpFetcher::new()?, InstallerConfig::default());
//! let request = InstallRequest::new("https://example.com/proj-data.tar.gz", "2025-02-01");
//! let outcome = installer.install(&request, None).await?;
//! ```

mod accumulator;
mod archive;
mod config;
mod error;
mod fetch;
mod gzip;
#[allow(clippy::module_inception)]
mod installer;
mod ledger;
mod progress;
mod sanitize;
mod store;

#[cfg(test)]
pub(crate) mod testing;

// Orchestration
pub use config::{default_store_dir, InstallerConfig, DEFAULT_STORE_NAME};
pub use installer::{BundleInstaller, InstallOutcome, InstallRequest, InstallStatus};
pub use progress::{InstallStage, ProgressCallback, ProgressReport, ProgressTracker};

// Errors
pub use error::{ErrorKind, InstallError, InstallResult};

// Streaming stages
pub use accumulator::{ByteAccumulator, DEFAULT_CHUNK_SIZE};
pub use archive::{padding, ArchiveEntry, ArchiveReader, EntryHeader, EntryKind, BLOCK_SIZE};
pub use fetch::{
    with_idle_timeout, ArchiveFetcher, BoxFuture, ByteStream, FetchedArchive, HttpFetcher,
};
pub use gzip::gunzip;
pub use sanitize::sanitize_path;

// Persistence
pub use ledger::{VersionLedger, VERSION_MARKER};
pub use store::{DirectoryStore, StoreEntry, StoreFile};
