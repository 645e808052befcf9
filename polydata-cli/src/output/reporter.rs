//! Terminal reporter for download events.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use polydata::{Event, ReportContext, Reporter};

/// Prefix on every status line.
pub const LINE_PREFIX: &str = "[polydata]";

const BAR_TEMPLATE: &str = "{prefix:>10.cyan.bold} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}";

/// Prints status lines above a single overall progress bar.
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(bar_style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(bar_style.progress_chars("=> "));
        }
        bar.set_prefix("polydata");
        Self { bar }
    }

    /// Handle on the bar, for suspending it around prompts.
    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&mut self, event: &Event, context: &ReportContext) {
        match event {
            Event::Progress(p) => self.bar.set_position(p.clamp(0.0, 100.0).round() as u64),
            Event::StartItem(item) => self.bar.set_message(item.id.clone()),
            _ => {}
        }
        if let Some(line) = status_line(event, context) {
            if event.is_error() {
                self.bar.println(style(line).red().to_string());
            } else {
                self.bar.println(line);
            }
        }
    }
}

/// The printed line for an event, indented by group depth.
pub fn status_line(event: &Event, context: &ReportContext) -> Option<String> {
    let message = match event {
        Event::StartItem(item) => format!(
            "Downloading package {} to {}...",
            item.id,
            context.dir.display()
        ),
        Event::FinishGroup(group) if context.had_errors => {
            format!("Downloaded collection {} with errors", group.id)
        }
        Event::FinishGroup(group) => format!("Done downloading collection {}", group.id),
        Event::StartGroup(_)
        | Event::UpToDate(_)
        | Event::Stale(_)
        | Event::StartUnpack(_)
        | Event::Error { .. } => event.to_string(),
        _ => return None,
    };
    let indent = "  ".repeat(context.depth);
    Some(format!("{} {}{}", LINE_PREFIX, indent, message))
}
