//! Progress reporting.
//!
//! `ProgressReporter` feeds a caller-supplied callback at coarse intervals
//! while tracks are matched, possibly from several worker threads. The
//! remaining helpers drive the CLI's progress bars and spinners, with a
//! log-only mode where bars are hidden for tail-friendly output.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Callback Reporting
// ============================================================================

/// Snapshot handed to progress callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * self.current as f64 / self.total as f64
        }
    }
}

/// Progress callback. Errors and panics are logged and ignored.
pub type ProgressFn<'f> = dyn Fn(&Progress) -> anyhow::Result<()> + Send + Sync + 'f;

/// Minimum number of tracks between callback invocations
const MIN_INTERVAL: usize = 100;
/// Callbacks per run on large inputs
const TARGET_REPORTS: usize = 20;

/// Counts processed items and invokes the callback on interval boundaries.
pub struct ProgressReporter<'c> {
    callback: Option<&'c ProgressFn<'c>>,
    label: String,
    total: usize,
    interval: usize,
    done: AtomicUsize,
}

impl<'c> ProgressReporter<'c> {
    pub fn new(callback: Option<&'c ProgressFn<'c>>, label: impl Into<String>, total: usize) -> Self {
        Self {
            callback,
            label: label.into(),
            total,
            interval: (total / TARGET_REPORTS).max(MIN_INTERVAL),
            done: AtomicUsize::new(0),
        }
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    /// Record one processed item.
    pub fn tick(&self) {
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if current % self.interval == 0 && current < self.total {
            self.emit(current);
        }
    }

    /// Report completion. Always invokes the callback once.
    pub fn finish(&self) {
        self.emit(self.total);
    }

    fn emit(&self, current: usize) {
        let Some(callback) = self.callback else {
            return;
        };
        let progress = Progress {
            current,
            total: self.total,
            message: format!("Matching {}", self.label),
        };
        match catch_unwind(AssertUnwindSafe(|| callback(&progress))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Progress callback failed at {}/{}: {:#}", current, self.total, e),
            Err(_) => debug!("Progress callback panicked at {}/{}", current, self.total),
        }
    }
}

// ============================================================================
// CLI Progress Bars
// ============================================================================

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Set log-only mode globally
pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

/// Check if log-only mode is enabled
pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}

/// Create a progress bar with consistent styling.
/// In log-only mode, the progress bar is hidden.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
                .unwrap()
                .progress_chars("=> "),
        );
    }
    pb.set_message(msg.to_string());
    pb
}

/// Log progress for tail-friendly output. Only logs in log-only mode.
pub fn log_progress(progress: &Progress) {
    if is_log_only() {
        info!(
            "[{}] {}/{} ({:.1}%)",
            progress.message,
            progress.current,
            progress.total,
            progress.percent()
        );
    }
}

/// Create a spinner for indeterminate progress.
/// In log-only mode, the spinner is hidden.
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{msg} {spinner} [{elapsed_precise}]")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_reporter_invokes_at_intervals() {
        let seen = Mutex::new(Vec::new());
        let callback = |p: &Progress| -> anyhow::Result<()> {
            seen.lock().unwrap().push(p.current);
            Ok(())
        };
        let reporter = ProgressReporter::new(Some(&callback), "a -> b", 250);
        assert_eq!(reporter.interval(), 100);
        for _ in 0..250 {
            reporter.tick();
        }
        reporter.finish();
        assert_eq!(*seen.lock().unwrap(), vec![100, 200, 250]);
    }

    #[test]
    fn test_reporter_swallows_errors_and_panics() {
        let failing = |_: &Progress| -> anyhow::Result<()> { anyhow::bail!("display closed") };
        let reporter = ProgressReporter::new(Some(&failing), "x", 1);
        reporter.tick();
        reporter.finish();

        let panicking = |_: &Progress| -> anyhow::Result<()> { panic!("boom") };
        let reporter = ProgressReporter::new(Some(&panicking), "x", 1);
        reporter.finish();
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }
}
