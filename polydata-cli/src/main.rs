//! Polydata CLI - Command-line interface
//!
//! Download, inspect and update the language models and corpora described by
//! a remote catalog.

mod commands;
mod error;
mod output;

use std::process;

use clap::{Parser, Subcommand};
use console::style;
use polydata::logging::init_logging;

use commands::catalog::{LanguagesArgs, ListArgs, TasksArgs};
use commands::common::GlobalArgs;
use commands::config::ConfigCommands;
use commands::download::{DownloadArgs, UpdateArgs};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "polydata", version, about = "Download and manage multilingual NLP resources")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download packages or collections
    Download(DownloadArgs),

    /// Re-download every out-of-date package
    Update(UpdateArgs),

    /// Show the catalog with install markers
    List(ListArgs),

    /// Show the install status of packages or collections
    Status {
        /// Package or collection ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show catalog details for one id
    Info {
        /// Package or collection id
        id: String,
    },

    /// Print where an installed package lives
    Locate {
        /// Package id
        id: String,
    },

    /// List supported languages
    Languages(LanguagesArgs),

    /// List supported tasks
    Tasks(TasksArgs),

    /// Write a configuration file with detected defaults
    Init,

    /// View or change configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let global = cli.global;
    match cli.command {
        Commands::Download(args) => commands::download::run_download(&global, args),
        Commands::Update(args) => commands::download::run_update(&global, args),
        Commands::List(args) => commands::catalog::run_list(&global, args),
        Commands::Status { ids } => commands::catalog::run_status(&global, &ids),
        Commands::Info { id } => commands::catalog::run_info(&global, &id),
        Commands::Locate { id } => commands::catalog::run_locate(&global, &id),
        Commands::Languages(args) => commands::catalog::run_languages(&global, args),
        Commands::Tasks(args) => commands::catalog::run_tasks(&global, args),
        Commands::Init => commands::init::run(),
        Commands::Config(command) => commands::config::run(command),
    }
}

fn main() {
    let cli = Cli::parse();

    let _guard = match init_logging(cli.global.log_level(), cli.global.log_dir.as_deref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{} {}", style("warning:").yellow().bold(), e);
            None
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_with_global_flags() {
        let cli = Cli::try_parse_from([
            "polydata", "download", "TASK:ner2", "embeddings2.en", "--keep-going", "-d", "/data",
        ])
        .unwrap();

        assert_eq!(cli.global.dir.as_deref(), Some(std::path::Path::new("/data")));
        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.ids, vec!["TASK:ner2", "embeddings2.en"]);
                assert!(args.errors.keep_going);
                assert!(!args.force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_download_requires_ids() {
        assert!(Cli::try_parse_from(["polydata", "download"]).is_err());
    }
}
