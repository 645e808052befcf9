//! Init command - initialize configuration file.

use polydata::config::{config_file_path, default_download_dir, ConfigFile, DEFAULT_INDEX_URL};

use crate::error::CliError;

/// Run the init command.
pub fn run() -> Result<(), CliError> {
    let mut config = ConfigFile::load()?;
    let filled = fill_defaults(&mut config)?;

    config.save()?;
    let path = config_file_path()?;
    println!("Configuration file: {}", path.display());
    for line in filled {
        println!("  {}", line);
    }
    println!();
    println!("Edit this file to customize polydata settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

/// Set the index URL and data directory when absent; returns what was set.
fn fill_defaults(config: &mut ConfigFile) -> Result<Vec<String>, CliError> {
    let mut filled = Vec::new();
    if config.catalog.url.is_none() {
        config.catalog.url = Some(DEFAULT_INDEX_URL.to_string());
        filled.push(format!("catalog.url = {}", DEFAULT_INDEX_URL));
    }
    if config.download.directory.is_none() {
        let dir = default_download_dir()?;
        filled.push(format!("download.directory = {}", dir.display()));
        config.download.directory = Some(dir);
    }
    Ok(filled)
}
