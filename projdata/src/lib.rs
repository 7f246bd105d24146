//! projdata - versioned data bundle installer
//!
//! This library installs a gzip-compressed tar bundle from an HTTP URL into
//! a local directory store. Installs are streamed end to end and guarded by
//! a version marker so a bundle is only fetched when its version changes.
//!
//! - [`installer`]: the streaming install pipeline and its store
//! - [`bridge`]: runs installs on a worker task behind a message protocol
//! - [`bundle`]: installed bundle handles and mount negotiation
//! - [`config`] and [`logging`]: ambient setup for binaries

pub mod bridge;
pub mod bundle;
pub mod config;
pub mod installer;
pub mod logging;

pub use bundle::{ensure_bundle, DataBundle, EngineCapabilities, MountPlan};
pub use installer::{BundleInstaller, InstallError, InstallOutcome, InstallRequest, InstallResult};
