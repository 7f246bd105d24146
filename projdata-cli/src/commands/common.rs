//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;

use clap::Args;
use projdata::config::ConfigFile;
use projdata::installer::{DirectoryStore, InstallerConfig};

use crate::error::CliError;

/// Store selection shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Directory holding the stores [default: config.ini or the user data dir]
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Store to use [default: config.ini or proj-data]
    #[arg(long, value_name = "NAME")]
    pub store_name: Option<String>,
}

/// Resolve installer settings. CLI arguments take precedence over the config file.
pub fn installer_config(config: &ConfigFile, store: &StoreArgs) -> InstallerConfig {
    let mut resolved = config.installer_config();
    if let Some(ref dir) = store.store_dir {
        resolved.store_dir = dir.clone();
    }
    if let Some(ref name) = store.store_name {
        resolved = resolved.with_default_store_name(name.clone());
    }
    resolved
}

/// Open the selected store.
pub async fn open_store(
    config: &ConfigFile,
    store: &StoreArgs,
) -> Result<DirectoryStore, CliError> {
    let resolved = installer_config(config, store);
    Ok(DirectoryStore::open(&resolved.store_dir, &resolved.default_store_name).await?)
}

/// Format a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
