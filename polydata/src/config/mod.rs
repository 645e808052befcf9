//! Engine configuration, the settings file and default directories.

mod data_dir;
mod engine;
mod file;

pub use data_dir::{
    default_download_dir, is_writable, resolve_download_dir, DATA_DIR_NAME, SYSTEM_DATA_DIRS,
};
pub use engine::{EngineConfig, DEFAULT_INDEX_URL};
pub use file::{
    config_file_path, CatalogSettings, ConfigError, ConfigFile, ConfigKey, DownloadSettings,
    CONFIG_DIR_NAME, CONFIG_FILE_NAME,
};
