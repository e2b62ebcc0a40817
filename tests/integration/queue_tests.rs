//! Queue ordering, serialization and cancellation

use crate::helpers::{build_engine, test_config, MockRunner, RecordingSink};
use remedy::events::RemediationEvent;
use remedy::report::{ReportInput, ReportStatus, Severity};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn dependency(module: &str) -> ReportInput {
    ReportInput::new(
        "DependencyError",
        &format!("Cannot find module '{module}'"),
        Severity::Medium,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_report_in_flight() {
    let runner = Arc::new(MockRunner::new(false, Duration::from_millis(5)));
    let sink = Arc::new(RecordingSink::default());
    let engine = Arc::new(build_engine(test_config(), runner.clone(), sink.clone()));

    let mut submitters = Vec::new();
    for t in 0..4 {
        let engine = engine.clone();
        submitters.push(tokio::spawn(async move {
            for i in 0..5 {
                engine.report_error(dependency(&format!("pkg-{t}-{i}"))).unwrap();
            }
        }));
    }
    for s in submitters {
        s.await.unwrap();
    }
    engine.wait_idle().await;

    assert_eq!(runner.calls().len(), 20);
    assert_eq!(runner.max_in_flight(), 1);
    assert_eq!(
        sink.names().iter().filter(|n| **n == "fix_applied").count(),
        20
    );
}

#[tokio::test]
async fn test_ids_unique_and_each_processed_once() {
    let runner = Arc::new(MockRunner::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let engine = build_engine(test_config(), runner, sink.clone());

    let ids: Vec<_> = (0..25)
        .map(|i| engine.report_error(dependency(&format!("m{i}"))).unwrap())
        .collect();
    engine.wait_idle().await;

    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());

    let mut processed = Vec::new();
    for event in sink.events() {
        if let RemediationEvent::FixApplied { report, .. } = event {
            processed.push(report.id);
        }
    }
    assert_eq!(processed, ids, "FIFO, exactly once");
}

#[tokio::test]
async fn test_submit_does_not_block_on_processing() {
    let runner = Arc::new(MockRunner::new(false, Duration::from_millis(50)));
    let engine = build_engine(test_config(), runner, Arc::new(RecordingSink::default()));

    let start = std::time::Instant::now();
    for i in 0..5 {
        engine.report_error(dependency(&format!("slow{i}"))).unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(50));

    let status = engine.get_queue_status();
    assert!(status.is_processing);
    assert!(status.queue_length >= 4);
    engine.wait_idle().await;
    assert!(!engine.get_queue_status().is_processing);
}

#[tokio::test]
async fn test_cancel_queued_report() {
    let runner = Arc::new(MockRunner::new(false, Duration::from_millis(30)));
    let sink = Arc::new(RecordingSink::default());
    let engine = build_engine(test_config(), runner.clone(), sink.clone());

    let first = engine.report_error(dependency("first")).unwrap();
    let second = engine.report_error(dependency("second")).unwrap();
    assert!(engine.cancel(second));
    assert!(!engine.cancel(second));
    engine.wait_idle().await;

    assert_eq!(engine.get_report(first).unwrap().status, ReportStatus::Fixed);
    assert_eq!(
        engine.get_report(second).unwrap().status,
        ReportStatus::Cancelled
    );
    assert_eq!(runner.calls(), vec!["npm install first".to_string()]);
    assert_eq!(engine.get_health().active_errors, 0);
}

#[tokio::test]
async fn test_processing_resumes_after_idle() {
    let runner = Arc::new(MockRunner::succeeding());
    let engine = build_engine(test_config(), runner.clone(), Arc::new(RecordingSink::default()));

    engine.report_error(dependency("a")).unwrap();
    engine.wait_idle().await;
    engine.report_error(dependency("b")).unwrap();
    engine.wait_idle().await;

    assert_eq!(runner.calls().len(), 2);
    assert_eq!(engine.history().len(), 2);
}

#[tokio::test]
async fn test_counters_reflect_outcomes() {
    let sink = Arc::new(RecordingSink::default());
    let ok = build_engine(test_config(), Arc::new(MockRunner::succeeding()), sink.clone());
    ok.report_error(dependency("a")).unwrap();
    ok.report_error(dependency("b")).unwrap();
    ok.wait_idle().await;

    let health = ok.get_health();
    assert_eq!(health.fixed_errors, 2);
    assert_eq!(health.failed_errors, 0);
    assert_eq!(health.active_errors, 0);

    let mut config = test_config();
    config.executor.max_retries = 1;
    let bad = build_engine(config, Arc::new(MockRunner::failing()), sink);
    bad.report_error(dependency("c")).unwrap();
    bad.wait_idle().await;
    assert_eq!(bad.get_health().failed_errors, 1);
}
