//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A task spinner with CI fallback
///
/// Interactive terminals get an indicatif spinner; CI and piped output get
/// plain lines.
pub struct TaskSpinner {
    spinner: Option<ProgressBar>,
}

impl TaskSpinner {
    /// Start a spinner with a message
    pub fn start(ctx: &UiContext, message: &str) -> Self {
        if ctx.use_fancy_output() {
            let spinner = ProgressBar::new_spinner();
            if let Ok(spinner_style) =
                ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}")
            {
                spinner.set_style(spinner_style);
            }
            spinner.set_message(message.to_string());
            spinner.enable_steady_tick(Duration::from_millis(120));
            Self {
                spinner: Some(spinner),
            }
        } else {
            println!("{} {}", style("...").dim(), message);
            Self { spinner: None }
        }
    }

    /// Update the spinner message
    pub fn message(&self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.set_message(message.to_string());
        }
    }

    /// Stop with success message
    pub fn stop(self, message: &str) {
        if let Some(spinner) = self.spinner {
            spinner.finish_and_clear();
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(self, message: &str) {
        if let Some(spinner) = self.spinner {
            spinner.finish_and_clear();
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }

    /// Stop with warning message
    pub fn stop_warn(self, message: &str) {
        if let Some(spinner) = self.spinner {
            spinner.finish_and_clear();
            println!("{} {}", style("!").yellow(), message);
        } else {
            println!("{} {}", style("[WARN]").yellow(), message);
        }
    }
}
