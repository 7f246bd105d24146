//! Configuration file support.
//!
//! Settings live in an INI file, by default `<config_dir>/projdata/config.ini`:
//!
//! ```ini
//! [bundle]
//! url = https://example.com/proj-data.tar.gz
//! version = 2025-02-01
//! store_name = proj-data
//!
//! [store]
//! dir = /var/lib/projdata
//!
//! [network]
//! idle_timeout_secs = 30
//!
//! [logging]
//! dir = /var/log/projdata
//! level = debug
//! ```
//!
//! Every key is optional. A missing file is the same as an empty one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::installer::InstallerConfig;

/// Log levels accepted in `[logging] level`.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {section}.{key}: {value:?} ({reason})")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings read from the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub bundle_url: Option<String>,
    pub bundle_version: Option<String>,
    pub store_name: Option<String>,
    pub store_dir: Option<PathBuf>,
    /// `None` when unset or set to 0.
    pub idle_timeout: Option<Duration>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ConfigFile {
    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("projdata").join("config.ini"))
    }

    /// Load from the default location, or defaults if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let ini = Ini::load_from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|s| s.get(key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let idle_timeout = match get("network", "idle_timeout_secs") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidValue {
                        section: "network",
                        key: "idle_timeout_secs",
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Some(Duration::from_secs(secs)).filter(|d| !d.is_zero())
            }
            None => None,
        };

        let log_level = match get("logging", "level") {
            Some(level) => {
                let lower = level.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&lower.as_str()) {
                    return Err(ConfigError::InvalidValue {
                        section: "logging",
                        key: "level",
                        value: level,
                        reason: format!("expected one of {}", LOG_LEVELS.join(", ")),
                    });
                }
                Some(lower)
            }
            None => None,
        };

        Ok(Self {
            bundle_url: get("bundle", "url"),
            bundle_version: get("bundle", "version"),
            store_name: get("bundle", "store_name"),
            store_dir: get("store", "dir").map(PathBuf::from),
            idle_timeout,
            log_dir: get("logging", "dir").map(PathBuf::from),
            log_level,
        })
    }

    /// Installer settings from this file, with defaults for anything unset.
    pub fn installer_config(&self) -> InstallerConfig {
        let mut config = InstallerConfig::default().with_idle_timeout(self.idle_timeout);
        if let Some(ref dir) = self.store_dir {
            config.store_dir = dir.clone();
        }
        if let Some(ref name) = self.store_name {
            config = config.with_default_store_name(name.clone());
        }
        config
    }
}
