//! Catalog queries: `list`, `status`, `info`, `locate`, `languages`, `tasks`.

use clap::Args;
use console::style;
use polydata::{Entry, Status};

use super::common::{build_engine, columns, GlobalArgs};
use crate::error::CliError;

/// Columns used for language and task tables.
const TABLE_COLUMNS: usize = 3;

/// Arguments for `polydata list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Show individual packages
    #[arg(short, long)]
    pub packages: bool,

    /// Hide collections
    #[arg(long)]
    pub no_collections: bool,
}

pub fn run_list(global: &GlobalArgs, args: ListArgs) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    let listing =
        engine.list_catalog(global.dir.as_deref(), args.packages, !args.no_collections)?;
    print!("{}", listing);
    Ok(())
}

pub fn run_status(global: &GlobalArgs, ids: &[String]) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    for id in ids {
        let status = engine.status(id, global.dir.as_deref())?;
        println!("{:<24} {}", id, styled_status(status));
    }
    Ok(())
}

fn styled_status(status: Status) -> String {
    let text = status.as_str();
    match status {
        Status::Installed => style(text).green().to_string(),
        Status::Stale => style(text).red().to_string(),
        Status::Partial => style(text).yellow().to_string(),
        Status::NotInstalled => text.to_string(),
    }
}

pub fn run_info(global: &GlobalArgs, id: &str) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    let entry = engine.info(id)?;
    let status = engine.entry_status(&entry, global.dir.as_deref())?;

    println!("{}", style(entry.id()).bold());
    println!("  name:     {}", entry.name());
    match &entry {
        Entry::Item(item) => {
            println!("  task:     {}", item.task);
            println!("  language: {}", item.language);
            println!("  size:     {} bytes", item.size);
            if item.is_archive() {
                println!("  unzipped: {} bytes", item.unzipped_size);
            }
            println!("  url:      {}", item.url);
        }
        Entry::Group(group) => {
            println!("  packages: {}", group.packages.len());
            let children: Vec<&str> = group.children.iter().map(Entry::id).collect();
            println!("  children: {}", children.join(", "));
        }
    }
    println!("  status:   {}", styled_status(status));
    Ok(())
}

pub fn run_locate(global: &GlobalArgs, id: &str) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    println!("{}", engine.require_installed(id)?.display());
    Ok(())
}

/// Arguments for `polydata languages`.
#[derive(Debug, Args)]
pub struct LanguagesArgs {
    /// Only languages covered by this task
    #[arg(short, long)]
    pub task: Option<String>,
}

pub fn run_languages(global: &GlobalArgs, args: LanguagesArgs) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    let languages = engine.supported_languages(args.task.as_deref())?;
    println!("{}", columns(&languages, TABLE_COLUMNS));
    Ok(())
}

/// Arguments for `polydata tasks`.
#[derive(Debug, Args)]
pub struct TasksArgs {
    /// Only tasks available for this language code
    #[arg(short, long)]
    pub lang: Option<String>,
}

pub fn run_tasks(global: &GlobalArgs, args: TasksArgs) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    let tasks = engine.supported_tasks(args.lang.as_deref())?;
    println!("{}", columns(&tasks, TABLE_COLUMNS));
    Ok(())
}
