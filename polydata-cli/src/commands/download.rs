//! `download` and `update` commands.

use clap::Args;
use console::Term;
use polydata::{DownloadOptions, Engine, ErrorPolicy, SkipErrors};
use tracing::info;

use super::common::{build_engine, GlobalArgs};
use crate::error::CliError;
use crate::output::{ConsoleReporter, PromptPolicy};

/// Arguments for `polydata download`.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Package or collection ids (e.g. embeddings2.en, TASK:ner2, LANG:fr)
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Download even if already installed
    #[arg(short, long)]
    pub force: bool,

    #[command(flatten)]
    pub errors: ErrorArgs,
}

/// Arguments for `polydata update`.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub errors: ErrorArgs,
}

/// How failed packages are handled.
#[derive(Debug, Clone, Args)]
pub struct ErrorArgs {
    /// Keep going after a package fails instead of stopping
    #[arg(short = 'k', long)]
    pub keep_going: bool,

    /// Never ask whether to retry a failed package
    #[arg(long)]
    pub no_prompt: bool,
}

/// Options for a download under the global flags.
pub fn download_options(global: &GlobalArgs, errors: &ErrorArgs, force: bool) -> DownloadOptions {
    let mut options = DownloadOptions::default()
        .with_quiet(global.quiet)
        .with_force(force)
        .with_halt_on_error(!errors.keep_going);
    if let Some(dir) = &global.dir {
        options = options.with_dir(dir.clone());
    }
    options
}

/// Whether failures should be put to the user.
pub fn should_prompt(global: &GlobalArgs, errors: &ErrorArgs, interactive: bool) -> bool {
    interactive && errors.keep_going && !errors.no_prompt && !global.quiet
}

pub fn run_download(global: &GlobalArgs, args: DownloadArgs) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    let options = download_options(global, &args.errors, args.force);
    run_with_policy(&mut engine, global, &args.errors, |engine, policy, reporter| {
        engine.download(&args.ids, &options, policy, reporter)
    })
}

pub fn run_update(global: &GlobalArgs, args: UpdateArgs) -> Result<(), CliError> {
    let mut engine = build_engine(global)?;
    let options = download_options(global, &args.errors, false);
    run_with_policy(&mut engine, global, &args.errors, |engine, policy, reporter| {
        engine.update(&options, policy, reporter)
    })
}

fn run_with_policy<F>(
    engine: &mut Engine,
    global: &GlobalArgs,
    errors: &ErrorArgs,
    run: F,
) -> Result<(), CliError>
where
    F: FnOnce(
        &mut Engine,
        &mut dyn ErrorPolicy,
        &mut ConsoleReporter,
    ) -> polydata::SyncResult<bool>,
{
    let mut reporter = ConsoleReporter::new();
    let interactive = Term::stderr().is_term();
    let completed = if should_prompt(global, errors, interactive) {
        let mut policy = PromptPolicy::new(reporter.bar());
        run(engine, &mut policy, &mut reporter)
    } else {
        run(engine, &mut SkipErrors, &mut reporter)
    };
    reporter.finish();

    if completed? {
        info!("Download finished");
        Ok(())
    } else {
        Err(CliError::Halted)
    }
}
