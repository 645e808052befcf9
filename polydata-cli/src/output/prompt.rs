//! Interactive retry prompt.

use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use indicatif::ProgressBar;
use polydata::catalog::Item;
use polydata::{ErrorAction, ErrorPolicy};

/// Choices offered after a failed package, in menu order.
pub const CHOICES: [&str; 3] = ["No", "Yes", "Exit"];

/// Asks on the terminal whether to retry a failed package.
pub struct PromptPolicy {
    bar: ProgressBar,
}

impl PromptPolicy {
    /// `bar` is hidden while the prompt is shown.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ErrorPolicy for PromptPolicy {
    fn on_error(&mut self, item: &Item, _reason: &str) -> ErrorAction {
        let prompt = format!("Error installing package {}. Retry?", item.id);
        let choice = self.bar.suspend(|| {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(prompt)
                .items(&CHOICES[..])
                .default(0)
                .interact_opt()
        });
        match choice {
            Ok(Some(index)) => action_for(index),
            // Escape, or no terminal to ask on.
            Ok(None) | Err(_) => ErrorAction::Skip,
        }
    }
}

/// Map a menu index onto an action.
pub fn action_for(index: usize) -> ErrorAction {
    match CHOICES.get(index) {
        Some(&"Yes") => ErrorAction::Retry,
        Some(&"Exit") => ErrorAction::Halt,
        _ => ErrorAction::Skip,
    }
}
