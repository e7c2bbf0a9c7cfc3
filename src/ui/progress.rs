//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    bar: Option<ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            bar: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if !self.interactive {
            println!("{} {}", style("...").dim(), message);
            return;
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(spinner_style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        self.bar = Some(bar);
    }

    /// Show a line of progress without stopping
    pub fn message(&mut self, message: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(truncate(message, 60));
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        self.clear();
        if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("[OK] {}", message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        self.clear();
        if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("[FAIL] {}", message);
        }
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for TaskSpinner {
    fn drop(&mut self) {
        self.clear();
    }
}

fn truncate(line: &str, max: usize) -> String {
    let line = line.trim();
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Cloning...");
        spinner.message("Receiving objects");
        spinner.stop("Done");
        // Should not panic
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("📁 src", 60), "📁 src");
        let long = "📄".repeat(70);
        let cut = truncate(&long, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with("..."));
    }
}
