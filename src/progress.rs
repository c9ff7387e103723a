//! Progress bar for plan execution

use declarative::{ExecutionResult, PhaseStatus, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// [`ProgressCallback`] drawing one bar over all phases of a run
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Bar over `total` phases, hidden when `quiet`
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        match ProgressStyle::default_bar().template(TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=>-")),
            Err(e) => log::debug!("Falling back to default progress style: {e}"),
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_level_start(&mut self, level: usize, count: usize) {
        log::debug!("Level {level}: {count} phase(s)");
    }

    fn on_phase_start(&mut self, _id: &str, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_phase_complete(&mut self, id: &str, result: &ExecutionResult) {
        let symbol = match result.status {
            PhaseStatus::Succeeded => "✓",
            PhaseStatus::Failed | PhaseStatus::TimedOut => "✗",
            PhaseStatus::Skipped => "⊘",
        };
        self.bar.set_message(format!("{symbol} {id}"));
        self.bar.inc(1);
    }

    fn on_level_complete(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ExecuteOptions, Phase, PhaseExecutor, execute_plan};
    use serde_json::json;

    #[test]
    fn test_counts_every_phase() {
        let phases = vec![
            Phase::from_config("a", &json!({})).unwrap(),
            Phase::from_config("b", &json!({"waitFor": {"dependsOn": "a"}})).unwrap(),
        ];
        let mut progress = BarProgress::new(phases.len(), true);
        execute_plan(
            &phases,
            &PhaseExecutor::default(),
            &ExecuteOptions::default(),
            &mut progress,
        )
        .unwrap();

        assert_eq!(progress.bar.position(), 2);
        progress.finish();
    }
}
