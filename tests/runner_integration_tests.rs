//! Integration tests for TidyRunner
//!
//! These tests verify:
//! - Runs on the blocking pool apply results to the model
//! - Timeouts leave the model's previous results in place
//! - Metrics follow runs driven by the runner

mod common;

use common::FakeEngine;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tidy_bridge::{Metrics, ModelState, RunError, TidyEvent, TidyModel, TidyRunner};
use tokio::time::{Duration, timeout};

fn slow_model(delay: Duration, text: &str) -> (Arc<FakeEngine>, TidyModel) {
    let engine = Arc::new(FakeEngine::slow(delay));
    let registry = common::registry(&engine);
    let model = TidyModel::with_text(engine.clone(), registry, text);
    (engine, model)
}

#[tokio::test]
async fn test_runner_applies_results() {
    let (engine, mut model) = slow_model(Duration::from_millis(10), "<!doctype html><p>x");
    let runner = TidyRunner::new(Duration::from_secs(5));

    let events = runner.run(&mut model).await.unwrap();

    assert_eq!(events[0], TidyEvent::TidyTextChanged);
    assert_eq!(model.tidy_text(), "<!doctype html><p>x\n");
    assert_eq!(model.state(), ModelState::Idle);
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_runner_timeout_keeps_previous_results() {
    let (_engine, mut model) = slow_model(Duration::from_millis(200), "<p>first");
    let patient = TidyRunner::new(Duration::from_secs(5));
    let hasty = TidyRunner::new(Duration::from_millis(20));

    patient.run(&mut model).await.unwrap();
    let before = model.last_run();

    model.set_source_text("<p>second");
    let result = hasty.run(&mut model).await;

    assert_eq!(result, Err(RunError::Timeout(Duration::from_millis(20))));
    assert_eq!(model.tidy_text(), before.tidy_text);
    assert_eq!(model.state(), ModelState::Dirty);

    // The abandoned run does not block the next one
    patient.run(&mut model).await.unwrap();
    assert_eq!(model.tidy_text(), "<p>second\n");
}

#[tokio::test]
async fn test_runner_surfaces_engine_failure() {
    let (_engine, mut model) = slow_model(Duration::ZERO, "<fatal>");
    let mut rx = model.subscribe();

    let result = TidyRunner::default().run(&mut model).await;
    assert_eq!(result, Err(RunError::EngineFailure { status: -1 }));

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");
    assert_eq!(event, TidyEvent::RunFailed { status: -1 });
}

#[tokio::test]
async fn test_runner_rejects_clean_model() {
    let (engine, mut model) = slow_model(Duration::ZERO, "<p>x");
    let runner = TidyRunner::default();

    runner.run(&mut model).await.unwrap();
    assert_eq!(runner.run(&mut model).await, Err(RunError::NotDirty));
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_metrics_follow_runner() {
    let metrics = Arc::new(Metrics::new());
    let (_engine, model) = slow_model(Duration::from_millis(100), "<p>x");
    let mut model = model.with_metrics(Arc::clone(&metrics));

    let result = TidyRunner::new(Duration::from_millis(10)).run(&mut model).await;
    assert!(matches!(result, Err(RunError::Timeout(_))));

    TidyRunner::default().run(&mut model).await.unwrap();

    assert_eq!(metrics.runs_timed_out.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.runs_completed.load(Ordering::Relaxed), 1);
    assert!(metrics.total_run_time_ms.load(Ordering::Relaxed) >= 100);
    metrics.log_summary();
}

#[test]
fn test_runner_from_sync_code() {
    let (_engine, mut model) = slow_model(Duration::ZERO, "<p>sync");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let events = runtime.block_on(TidyRunner::default().run(&mut model));
    tokio_test::assert_ok!(events);
    assert_eq!(model.tidy_text(), "<p>sync\n");
}
