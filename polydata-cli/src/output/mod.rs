//! Terminal output: event reporting and the retry prompt.

mod prompt;
mod reporter;

pub use prompt::{action_for, PromptPolicy, CHOICES};
pub use reporter::{status_line, ConsoleReporter, LINE_PREFIX};
