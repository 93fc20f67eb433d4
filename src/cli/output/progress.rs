//! Progress indicators using indicatif
//!
//! - Spinner for indeterminate work (probing, coverage passes)
//! - Iteration bar for the convergence loop
//!
//! Both draw to stderr and are hidden in JSON mode so stdout only carries the
//! command result.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::domain::models::LoopState;

const ITERATION_TEMPLATE: &str = "[{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";

const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Create a spinner for indeterminate operations
pub fn create_spinner(message: impl Into<String>, hidden: bool) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .expect("Invalid spinner template")
            .tick_chars(SPINNER_CHARS),
    );
    spinner.set_message(message.into());
    if hidden {
        spinner.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        spinner.enable_steady_tick(Duration::from_millis(80));
    }
    spinner
}

/// Create a bar counting loop iterations against the budget
pub fn create_iteration_bar(max_iterations: u32, hidden: bool) -> ProgressBar {
    let bar = ProgressBar::new(u64::from(max_iterations));
    bar.set_style(
        ProgressStyle::default_bar()
            .template(ITERATION_TEMPLATE)
            .expect("Invalid progress bar template")
            .progress_chars(PROGRESS_CHARS),
    );
    if hidden {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        bar.enable_steady_tick(Duration::from_millis(100));
    }
    bar.set_message("generating tests");
    bar
}

/// Message shown on the iteration bar after a decision
pub fn iteration_message(state: &LoopState) -> String {
    let mut message = format!("coverage {:.1}% / target {:.1}%", state.coverage, state.target);
    if let Some(error) = state.errors.last().filter(|e| e.iteration + 1 >= state.iteration) {
        message.push_str(&format!(" (last: {} failed)", error.kind));
    }
    message
}

pub trait ProgressBarExt {
    fn finish_success(&self, message: impl Into<String>);

    fn finish_error(&self, message: impl Into<String>);

    fn finish_warning(&self, message: impl Into<String>);

    /// Move an iteration bar to the state's position
    fn track(&self, state: &LoopState);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✗ {}", message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("! {}", message.into()));
    }

    fn track(&self, state: &LoopState) {
        // Decide leaves the counter in place when the target is met
        let completed = if state.coverage >= state.target {
            state.iteration + 1
        } else {
            state.iteration
        };
        self.set_position(u64::from(completed.min(state.max_iterations)));
        self.set_message(iteration_message(state));
    }
}
