//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;

use clap::Args;
use polydata::config::ConfigFile;
use polydata::{Engine, EngineConfig};
use tracing::debug;

use crate::error::CliError;

/// Options accepted by every command.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Index URL (mirror base URL, or bucket name with source = bucket)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Data directory to install into and check against
    #[arg(short = 'd', long = "dir", global = true)]
    pub dir: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

impl GlobalArgs {
    /// Default log filter for the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, _) => "polydata=debug,info",
        }
    }
}

/// Engine configuration: defaults, then the settings file, then CLI flags.
pub fn resolve_config(global: &GlobalArgs, file: &ConfigFile) -> EngineConfig {
    let mut config = file.to_engine_config();
    if let Some(url) = &global.url {
        config = config.with_index_url(url.clone());
    }
    if let Some(dir) = &global.dir {
        config = config.with_download_dir(dir.clone());
    }
    config
}

/// Build an HTTP engine from the settings file and CLI flags.
pub fn build_engine(global: &GlobalArgs) -> Result<Engine, CliError> {
    let file = ConfigFile::load()?;
    let config = resolve_config(global, &file);
    debug!(url = %config.index_url(), "Building engine");
    Ok(Engine::new(config)?)
}

/// Lay `names` out in `cols` left-aligned columns.
pub fn columns(names: &[String], cols: usize) -> String {
    let cols = cols.max(1);
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0) + 2;
    names
        .chunks(cols)
        .map(|row| {
            row.iter()
                .map(|n| format!("{:<width$}", n, width = width))
                .collect::<String>()
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
