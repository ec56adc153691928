// Run and event metrics
//
// Lightweight counters shared between a model and its runner

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for engine runs and model activity.
///
/// Uses atomic operations so one instance can be shared as `Arc<Metrics>`
/// between a model and the runner driving it from another task.
#[derive(Debug)]
pub struct Metrics {
    /// Runs whose results were applied to a model
    pub runs_completed: AtomicU64,

    /// Runs the engine reported as fatal
    pub runs_failed: AtomicU64,

    /// Runs abandoned after exceeding the runner timeout
    pub runs_timed_out: AtomicU64,

    /// Engine time of completed runs in milliseconds
    pub total_run_time_ms: AtomicU64,

    /// Option values that actually changed
    pub option_changes: AtomicU64,

    /// Suspect decodes reported to the caller
    pub encoding_issues: AtomicU64,

    /// Events sent on a model's broadcast channel
    pub events_broadcast: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_timed_out: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            option_changes: AtomicU64::new(0),
            encoding_issues: AtomicU64::new(0),
            events_broadcast: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a successful run and its engine time
    pub fn record_run_completed(&self, duration: Duration) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.total_run_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_timed_out(&self) {
        self.runs_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_option_change(&self) {
        self.option_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoding_issue(&self) {
        self.encoding_issues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_broadcast(&self) {
        self.events_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average engine time per completed run in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        let count = self.runs_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Tidy Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} completed, {} failed, {} timed out",
            self.runs_completed.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed),
            self.runs_timed_out.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total run time: {:.2}s (avg: {:.2}ms per run)",
            self.total_run_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_run_time_ms()
        );
        tracing::info!(
            "Option changes: {}, encoding issues: {}, events: {}",
            self.option_changes.load(Ordering::Relaxed),
            self.encoding_issues.load(Ordering::Relaxed),
            self.events_broadcast.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
