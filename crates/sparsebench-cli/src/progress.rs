//! Terminal progress display.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use sparsebench_core::{LoadTestStats, StressStepResult};
use sparsebench_engine::{Progress, ResultSink, SessionReport, TracingSink};

/// [`ResultSink`] that drives an indicatif bar and mirrors events to the log.
pub struct ProgressSink {
    bar: ProgressBar,
    log: TracingSink,
}

impl ProgressSink {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar, log: TracingSink }
    }

    /// Clear the bar before the final report is printed.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} comparisons {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl ResultSink for ProgressSink {
    fn on_progress(&self, progress: Progress) {
        if let Some(expected) = progress.expected {
            if self.bar.length() != Some(expected as u64) {
                self.bar.set_length(expected as u64);
                self.bar.set_style(bar_style());
            }
        }
        self.bar.set_position(progress.completed as u64);
        self.log.on_progress(progress);
    }

    fn on_load_complete(&self, stats: &LoadTestStats) {
        self.bar.set_message(format!("{:.1} qps", stats.achieved_qps));
        self.log.on_load_complete(stats);
    }

    fn on_stress_step(&self, step: &StressStepResult) {
        self.bar.println(format!(
            "concurrency {:>4}: {:>8.1} qps, {:>6.1}% success",
            step.concurrency,
            step.stats.achieved_qps,
            step.stats.success_rate() * 100.0
        ));
        self.bar.set_position(0);
        self.log.on_stress_step(step);
    }

    fn on_session_finished(&self, report: &SessionReport) {
        self.bar.finish_and_clear();
        self.log.on_session_finished(report);
    }
}
