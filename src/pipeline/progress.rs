//! Progress Tracker for the notes pipeline
//!
//! Shows one spinner per stage on stderr.

use crate::error::Stage;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Tracks and displays progress through the pipeline stages
pub struct ProgressTracker {
    /// Spinner for the stage in flight
    spinner: Option<ProgressBar>,
    /// Stage currently running
    current_stage: Option<Stage>,
    /// Stages finished so far
    completed: Vec<Stage>,
    /// Whether to show output (false for tests/quiet mode)
    show_output: bool,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new() -> Self {
        Self {
            spinner: None,
            current_stage: None,
            completed: Vec::new(),
            show_output: true,
        }
    }

    /// Create a quiet progress tracker (no output)
    pub fn quiet() -> Self {
        Self {
            show_output: false,
            ..Self::new()
        }
    }

    /// Start a new stage
    pub fn start_stage(&mut self, stage: Stage, message: &str) {
        self.current_stage = Some(stage);
        if self.show_output {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("  {spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(message.to_string());
            spinner.enable_steady_tick(Duration::from_millis(100));
            self.spinner = Some(spinner);
        }
    }

    /// Finish the current stage with a short summary
    pub fn finish_stage(&mut self, summary: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!("{}: {}", self.stage_name(), summary));
        }
        if let Some(stage) = self.current_stage.take() {
            self.completed.push(stage);
        }
    }

    /// Abandon the current stage (on error or cancellation)
    pub fn abandon(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.abandon_with_message(format!("{}: failed", self.stage_name()));
        }
        self.current_stage = None;
    }

    /// Stages finished so far
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    fn stage_name(&self) -> &'static str {
        self.current_stage.map(|s| s.name()).unwrap_or("pipeline")
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages() {
        let mut tracker = ProgressTracker::quiet();

        tracker.start_stage(Stage::Fetch, "Fetching");
        assert_eq!(tracker.current_stage, Some(Stage::Fetch));

        tracker.finish_stage("12 KB");
        assert!(tracker.current_stage.is_none());
        assert_eq!(tracker.completed(), &[Stage::Fetch]);
    }

    #[test]
    fn test_abandon_does_not_complete() {
        let mut tracker = ProgressTracker::quiet();

        tracker.start_stage(Stage::Extract, "Extracting");
        tracker.abandon();

        assert!(tracker.completed().is_empty());
        assert!(tracker.current_stage.is_none());
    }
}
