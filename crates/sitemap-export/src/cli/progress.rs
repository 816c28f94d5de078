//! Spinner showing per-target progress while an export runs.

use super::output::format_count;
use crate::export::{Progress, TargetReport};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// [`Progress`] backed by an indicatif spinner on stderr.
pub struct SpinnerProgress {
    bar: ProgressBar,
    total: Mutex<Option<u64>>,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("  {spinner:.cyan} {msg} {elapsed:.dim}") {
            bar.set_style(style.tick_chars("\u{25b8}\u{25b9}\u{25b8}\u{25b9}\u{25b8}"));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            total: Mutex::new(None),
        }
    }

    /// A spinner that never draws, for quiet runs and tests.
    pub fn hidden() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
        Self {
            bar,
            total: Mutex::new(None),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub fn message(&self) -> String {
        self.bar.message()
    }

    fn total(&self) -> Option<u64> {
        self.total.lock().map(|t| *t).unwrap_or(None)
    }
}

impl Default for SpinnerProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for SpinnerProgress {
    fn target_started(&self, type_name: &str, total: Option<u64>) {
        if let Ok(mut slot) = self.total.lock() {
            *slot = total;
        }
        let msg = match total {
            Some(total) => format!("{type_name}: 0 / {}", format_count(total)),
            None => format!("{type_name}: starting"),
        };
        self.bar.set_message(msg);
    }

    fn records_seen(&self, type_name: &str, seen: u64) {
        let msg = match self.total() {
            Some(total) => format!("{type_name}: {} / {}", format_count(seen), format_count(total)),
            None => format!("{type_name}: {}", format_count(seen)),
        };
        self.bar.set_message(msg);
    }

    fn target_finished(&self, report: &TargetReport) {
        self.bar.println(format!(
            "  \u{2713} {:<14} {} urls in {} files",
            report.type_name,
            format_count(report.emitted),
            report.files.len()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let progress = SpinnerProgress::hidden();
        progress.target_started("buyer", Some(12_000));
        assert_eq!(progress.message(), "buyer: 0 / 12,000");
        progress.records_seen("buyer", 10_000);
        assert_eq!(progress.message(), "buyer: 10,000 / 12,000");

        progress.target_started("institution", None);
        progress.records_seen("institution", 7);
        assert_eq!(progress.message(), "institution: 7");
        progress.finish();
    }
}
