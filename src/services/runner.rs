use crate::state::{RunError, TidyEvent, TidyModel};
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Runs a model's engine call on the blocking thread pool.
///
/// The engine call itself cannot be interrupted. On timeout the model
/// leaves the running state without results, and the worker's eventual
/// answer is discarded.
#[derive(Debug, Clone)]
pub struct TidyRunner {
    timeout: Duration,
}

impl TidyRunner {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Prepare, execute off-thread, and apply one run.
    pub async fn run(&self, model: &mut TidyModel) -> Result<Vec<TidyEvent>, RunError> {
        let request = model.prepare_run()?;
        let generation = request.generation();
        let start = Instant::now();

        let worker = tokio::task::spawn_blocking(move || request.execute());

        let response = match timeout(self.timeout, worker).await {
            Ok(Ok(response)) => response,
            Ok(Err(join_error)) => {
                tracing::error!("Engine worker for run {} failed: {}", generation, join_error);
                model.abandon_run()?;
                return Err(RunError::Worker(join_error.to_string()));
            }
            Err(_) => {
                tracing::warn!("Engine run {} timed out after {:?}", generation, self.timeout);
                model.abandon_run()?;
                if let Some(metrics) = model.metrics() {
                    metrics.record_run_timed_out();
                }
                return Err(RunError::Timeout(self.timeout));
            }
        };

        tracing::debug!(
            "Engine run {} returned in {:.2}s",
            generation,
            start.elapsed().as_secs_f32()
        );
        model.complete_run(response)
    }
}

impl Default for TidyRunner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}
