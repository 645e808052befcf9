//! The `~/.polydata/config.ini` settings file.
//!
//! ```ini
//! [catalog]
//! url = http://whoisbigger.com/polyglot/
//! source = mirror
//! ttl_secs = 3600
//!
//! [download]
//! directory = /srv/polyglot_data
//! unpack = always
//! timeout_secs = 60
//! ```
//!
//! Every key is optional; unset keys keep the engine defaults.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::engine::EngineConfig;
use crate::catalog::IndexSource;
use crate::fetch::UnpackPolicy;

/// Directory holding the settings file, under the home directory.
pub const CONFIG_DIR_NAME: &str = ".polydata";

/// Settings file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Errors raised while reading or writing the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    /// The file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A key holds a value of the wrong shape.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// The key is not a known `section.key` name.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    /// No home directory to place the file in.
    #[error("could not determine the home directory")]
    NoHomeDir,
}

/// Path of the settings file: `~/.polydata/config.ini`.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// `[catalog]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSettings {
    pub url: Option<String>,
    pub source: Option<IndexSource>,
    pub ttl_secs: Option<u64>,
}

/// `[download]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSettings {
    pub directory: Option<PathBuf>,
    pub unpack: Option<UnpackPolicy>,
    pub timeout_secs: Option<u64>,
}

/// Parsed settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub catalog: CatalogSettings,
    pub download: DownloadSettings,
}

impl ConfigFile {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path()?)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini
                .section(Some(key.section()))
                .and_then(|s| s.get(key.key_name()))
            {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Write to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path()?)
    }

    /// Write to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_failed = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path).map_err(write_failed)
    }

    /// Apply the file on top of `base`.
    pub fn apply(&self, mut base: EngineConfig) -> EngineConfig {
        if let Some(url) = &self.catalog.url {
            base = base.with_index_url(url.clone());
        }
        if let Some(source) = self.catalog.source {
            base = base.with_source(source);
        }
        if let Some(ttl) = self.catalog.ttl_secs {
            base = base.with_catalog_ttl(Duration::from_secs(ttl));
        }
        if let Some(dir) = &self.download.directory {
            base = base.with_download_dir(dir.clone());
        }
        if let Some(unpack) = self.download.unpack {
            base = base.with_unpack(unpack);
        }
        if let Some(timeout) = self.download.timeout_secs {
            base = base.with_timeout(Duration::from_secs(timeout));
        }
        base
    }

    /// Engine configuration from this file over the defaults.
    pub fn to_engine_config(&self) -> EngineConfig {
        self.apply(EngineConfig::default())
    }
}

/// A settable `section.key` in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    CatalogUrl,
    CatalogSource,
    CatalogTtlSecs,
    DownloadDirectory,
    DownloadUnpack,
    DownloadTimeoutSecs,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::CatalogUrl,
            ConfigKey::CatalogSource,
            ConfigKey::CatalogTtlSecs,
            ConfigKey::DownloadDirectory,
            ConfigKey::DownloadUnpack,
            ConfigKey::DownloadTimeoutSecs,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::CatalogUrl | Self::CatalogSource | Self::CatalogTtlSecs => "catalog",
            Self::DownloadDirectory | Self::DownloadUnpack | Self::DownloadTimeoutSecs => {
                "download"
            }
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::CatalogUrl => "url",
            Self::CatalogSource => "source",
            Self::CatalogTtlSecs => "ttl_secs",
            Self::DownloadDirectory => "directory",
            Self::DownloadUnpack => "unpack",
            Self::DownloadTimeoutSecs => "timeout_secs",
        }
    }

    /// Dotted `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            Self::CatalogUrl => config.catalog.url.clone().unwrap_or_default(),
            Self::CatalogSource => config
                .catalog
                .source
                .map(|s| s.to_string())
                .unwrap_or_default(),
            Self::CatalogTtlSecs => config
                .catalog
                .ttl_secs
                .map(|v| v.to_string())
                .unwrap_or_default(),
            Self::DownloadDirectory => config
                .download
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
            Self::DownloadUnpack => config
                .download
                .unpack
                .map(|u| u.to_string())
                .unwrap_or_default(),
            Self::DownloadTimeoutSecs => config
                .download
                .timeout_secs
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse `value` and store it; an empty value unsets the key.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: self.name(),
            reason,
        };
        let text = (!value.is_empty()).then(|| value.to_string());

        match self {
            Self::CatalogUrl => config.catalog.url = text,
            Self::CatalogSource => {
                config.catalog.source = text.map(|t| t.parse()).transpose().map_err(invalid)?
            }
            Self::CatalogTtlSecs => {
                config.catalog.ttl_secs = parse_secs(text).map_err(invalid)?
            }
            Self::DownloadDirectory => config.download.directory = text.map(PathBuf::from),
            Self::DownloadUnpack => {
                config.download.unpack = text.map(|t| t.parse()).transpose().map_err(invalid)?
            }
            Self::DownloadTimeoutSecs => {
                let secs = parse_secs(text).map_err(invalid)?;
                if secs == Some(0) {
                    return Err(invalid("timeout must be at least one second".to_string()));
                }
                config.download.timeout_secs = secs;
            }
        }
        Ok(())
    }
}

fn parse_secs(text: Option<String>) -> Result<Option<u64>, String> {
    text.map(|t| {
        t.parse::<u64>()
            .map_err(|_| format!("'{}' is not a number of seconds", t))
    })
    .transpose()
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
