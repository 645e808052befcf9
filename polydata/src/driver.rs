//! Consumes a download stream and applies the caller's error policy.
//!
//! The driver is where events turn into decisions: an [`Event::Error`] either
//! raises, halts the whole request, asks an [`ErrorPolicy`] whether to retry,
//! or is skipped. Everything else goes to a [`Reporter`] for display.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::catalog::Item;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{DownloadStream, Event};
use crate::transport::Transport;

/// Options for [`Engine::download`](crate::Engine::download).
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Directory to download into; the engine's default when `None`.
    pub dir: Option<PathBuf>,

    /// Suppress everything but errors, and never ask the error policy.
    pub quiet: bool,

    /// Download even when the resource is already installed.
    pub force: bool,

    /// Stop at the first error and return `Ok(false)`.
    pub halt_on_error: bool,

    /// Turn the first error into `Err`.
    pub raise_on_error: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            dir: None,
            quiet: false,
            force: false,
            halt_on_error: true,
            raise_on_error: false,
        }
    }
}

impl DownloadOptions {
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_halt_on_error(mut self, halt: bool) -> Self {
        self.halt_on_error = halt;
        self
    }

    pub fn with_raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }
}

/// What to do after a failed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Carry on with the next item.
    Skip,
    /// Download the failed item again.
    Retry,
    /// Stop the whole request.
    Halt,
}

/// Decides how to continue after an item fails.
pub trait ErrorPolicy {
    fn on_error(&mut self, item: &Item, reason: &str) -> ErrorAction;
}

impl<F> ErrorPolicy for F
where
    F: FnMut(&Item, &str) -> ErrorAction,
{
    fn on_error(&mut self, item: &Item, reason: &str) -> ErrorAction {
        self(item, reason)
    }
}

/// Policy that never retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipErrors;

impl ErrorPolicy for SkipErrors {
    fn on_error(&mut self, _item: &Item, _reason: &str) -> ErrorAction {
        ErrorAction::Skip
    }
}

/// Where in the request an event was emitted.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    /// Number of enclosing groups.
    pub depth: usize,

    /// Whether an error has been seen inside the innermost enclosing group,
    /// or anywhere in the request at the top level.
    pub had_errors: bool,

    /// Directory being downloaded into.
    pub dir: PathBuf,
}

/// Receives events for display.
pub trait Reporter {
    fn report(&mut self, event: &Event, context: &ReportContext);
}

/// Reporter that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&mut self, _event: &Event, _context: &ReportContext) {}
}

/// Reporter that writes events to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, event: &Event, context: &ReportContext) {
        match event {
            Event::Error { id, reason, .. } => warn!(id = %id, "{}", reason),
            Event::Progress(p) => debug!(progress = *p, "Progress"),
            Event::FinishGroup(group) if context.had_errors => {
                warn!(id = %group.id, "Downloaded collection with errors")
            }
            Event::StartItem(item) => {
                info!(id = %item.id, dir = %context.dir.display(), "Downloading package")
            }
            Event::SelectDownloadDir(_)
            | Event::StartGroup(_)
            | Event::FinishGroup(_)
            | Event::UpToDate(_)
            | Event::Stale(_)
            | Event::StartUnpack(_) => info!(depth = context.depth, "{}", event),
            _ => debug!(depth = context.depth, "{}", event),
        }
    }
}

/// Runs a stream to completion under [`DownloadOptions`].
pub struct Driver<'a> {
    options: &'a DownloadOptions,
    policy: &'a mut dyn ErrorPolicy,
    reporter: &'a mut dyn Reporter,
}

impl<'a> Driver<'a> {
    pub fn new(
        options: &'a DownloadOptions,
        policy: &'a mut dyn ErrorPolicy,
        reporter: &'a mut dyn Reporter,
    ) -> Self {
        Self {
            options,
            policy,
            reporter,
        }
    }

    /// Consume `stream`.
    ///
    /// Returns `Ok(true)` when the stream ran to completion (possibly with
    /// skipped errors) and `Ok(false)` when it was halted.
    pub fn run<T: Transport>(&mut self, mut stream: DownloadStream<'_, T>) -> SyncResult<bool> {
        let mut context = ReportContext {
            dir: self
                .options
                .dir
                .clone()
                .unwrap_or_else(|| stream.download_dir().to_path_buf()),
            ..ReportContext::default()
        };

        // Error flags of the enclosing groups, outermost first.
        let mut outer_errors: Vec<bool> = Vec::new();

        while let Some(event) = stream.next() {
            if let Event::Error { id, item, reason } = &event {
                self.reporter.report(&event, &context);
                if self.options.raise_on_error {
                    return Err(match item {
                        Some(item) => SyncError::Transfer {
                            id: id.clone(),
                            url: item.url.clone(),
                            reason: reason.clone(),
                        },
                        None => SyncError::UnknownIdentifier(id.clone()),
                    });
                }
                if self.options.halt_on_error {
                    info!(id = %id, "Halting after error");
                    return Ok(false);
                }
                context.had_errors = true;

                if let (false, Some(item)) = (self.options.quiet, item) {
                    match self.policy.on_error(item, reason) {
                        ErrorAction::Retry => {
                            stream.retry();
                        }
                        ErrorAction::Halt => return Ok(false),
                        ErrorAction::Skip => {}
                    }
                }
                continue;
            }

            match &event {
                Event::SelectDownloadDir(dir) => context.dir = dir.clone(),
                Event::FinishGroup(_) => context.depth = context.depth.saturating_sub(1),
                _ => {}
            }
            if !self.options.quiet {
                self.reporter.report(&event, &context);
            }
            match event {
                Event::StartGroup(_) => {
                    context.depth += 1;
                    outer_errors.push(context.had_errors);
                    context.had_errors = false;
                }
                Event::FinishGroup(_) => {
                    let outer = outer_errors.pop().unwrap_or(false);
                    context.had_errors |= outer;
                }
                _ => {}
            }
        }
        Ok(true)
    }
}
