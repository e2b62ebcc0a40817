//! End-to-end remediation scenarios through the public engine API

use crate::helpers::{build_engine, test_config, MockRunner, RecordingSink};
use remedy::events::{NotificationSink, RemediationEvent};
use remedy::executor::DryRunCodeEditor;
use remedy::learning::JsonFileBackend;
use remedy::report::{LearningHints, ReportInput, ReportStatus, Severity};
use remedy::RemediationEngine;
use std::sync::Arc;

#[tokio::test]
async fn test_missing_dependency_fixed_first_try() {
    let runner = Arc::new(MockRunner::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let engine = build_engine(test_config(), runner.clone(), sink.clone());

    let id = engine
        .report_error(ReportInput::new(
            "DependencyError",
            "Cannot find module 'x'",
            Severity::High,
        ))
        .unwrap();
    engine.wait_idle().await;

    let report = engine.get_report(id).unwrap();
    assert_eq!(report.status, ReportStatus::Fixed);
    assert!(report
        .root_cause
        .as_deref()
        .unwrap()
        .to_lowercase()
        .contains("missing dependency"));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].iterations, 1);
    assert_eq!(report.retry_count, 0);
    assert_eq!(runner.calls(), vec!["npm install x".to_string()]);

    let record = engine.get_learning_snapshot().remove("DependencyError").unwrap();
    assert_eq!(record.successes(), 1);
    assert_eq!(record.failures(), 0);
    assert_eq!(record.success_rate, 1.0);

    assert_eq!(sink.names(), vec!["error_reported", "fix_applied"]);
    match &sink.events()[1] {
        RemediationEvent::FixApplied {
            suggestion,
            attempt,
            ..
        } => {
            assert_eq!(suggestion.strategy, "dependency_resolution");
            assert!(suggestion.confidence >= 0.5);
            assert!(attempt.success);
        }
        other => panic!("unexpected event {}", other.name()),
    }
}

#[tokio::test]
async fn test_always_failing_runner_exhausts_retries() {
    let runner = Arc::new(MockRunner::failing());
    let sink = Arc::new(RecordingSink::default());
    let engine = build_engine(test_config(), runner.clone(), sink.clone());

    let id = engine
        .report_error(ReportInput::new(
            "DependencyError",
            "Cannot find module 'x'",
            Severity::High,
        ))
        .unwrap();
    engine.wait_idle().await;

    let report = engine.get_report(id).unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    let attempt = report.last_attempt().unwrap();
    assert!(!attempt.success);
    assert_eq!(attempt.iterations, 5);
    assert_eq!(report.retry_count, 4);
    assert!(attempt.error.as_deref().unwrap().contains("404"));
    assert_eq!(runner.calls().len(), 5);

    assert_eq!(sink.names(), vec!["error_reported", "processing_error"]);

    let record = engine.get_learning_snapshot().remove("DependencyError").unwrap();
    assert_eq!(record.successes(), 0);
    assert_eq!(record.failures(), 1);
    assert_eq!(record.success_rate, 0.0);
}

#[tokio::test]
async fn test_unknown_category_uses_generic() {
    let runner = Arc::new(MockRunner::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let engine = build_engine(test_config(), runner, sink.clone());

    let id = engine
        .report_error(ReportInput::new("FooBarError", "the widget sneezed", Severity::Low))
        .unwrap();
    engine.wait_idle().await;

    let report = engine.get_report(id).unwrap();
    assert_eq!(
        report.root_cause.as_deref(),
        Some(remedy::classifier::UNKNOWN_ROOT_CAUSE)
    );
    match sink.events().last().unwrap() {
        RemediationEvent::FixApplied { suggestion, .. } => {
            assert_eq!(suggestion.strategy, "generic");
            assert!((suggestion.confidence - 0.3).abs() < 1e-6);
        }
        other => panic!("unexpected event {}", other.name()),
    }
}

#[tokio::test]
async fn test_disabled_strategy_emits_no_fix() {
    let mut config = test_config();
    config.strategy.disabled = vec!["network_repair".into()];
    let runner = Arc::new(MockRunner::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let engine = build_engine(config, runner.clone(), sink.clone());

    let id = engine
        .report_error(ReportInput::new("NetworkError", "ECONNREFUSED", Severity::Medium))
        .unwrap();
    engine.wait_idle().await;

    assert_eq!(engine.get_report(id).unwrap().status, ReportStatus::NoFix);
    assert_eq!(sink.names(), vec!["error_reported", "no_fix_available"]);
    assert!(runner.calls().is_empty());
    assert!(engine.get_learning_snapshot().is_empty());
}

#[tokio::test]
async fn test_hint_overrides_strategy() {
    let runner = Arc::new(MockRunner::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let engine = build_engine(test_config(), runner.clone(), sink);

    let mut input = ReportInput::new("FooBarError", "cannot write cache", Severity::Medium);
    input.hints = Some(LearningHints {
        preferred_strategy: Some("permission_repair".into()),
        replacement: None,
    });
    let id = engine.report_error(input).unwrap();
    engine.wait_idle().await;

    let report = engine.get_report(id).unwrap();
    assert_eq!(report.last_attempt().unwrap().strategy, "permission_repair");
    assert_eq!(runner.calls(), vec!["chmod -R u+rw .".to_string()]);
}

#[tokio::test]
async fn test_learning_persists_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learning.json");

    {
        let mut config = test_config();
        config.learning.path = Some(path.clone());
        let engine = build_engine(
            config,
            Arc::new(MockRunner::succeeding()),
            Arc::new(RecordingSink::default()),
        );
        engine
            .report_error(ReportInput::new("SyntaxError", "Unexpected token", Severity::Low))
            .unwrap();
        engine.shutdown().await;
    }

    let engine = RemediationEngine::builder(test_config())
        .learning_backend(Arc::new(JsonFileBackend::new(&path)))
        .dry_run(true)
        .build()
        .unwrap();
    let record = engine.get_learning_snapshot().remove("SyntaxError").unwrap();
    assert_eq!(record.successful_strategies, vec!["syntax_correction"]);
}

#[tokio::test]
async fn test_subscriber_sees_lifecycle() {
    let engine = build_engine(
        test_config(),
        Arc::new(MockRunner::succeeding()),
        Arc::new(RecordingSink::default()),
    );
    let mut rx = engine.subscribe();

    let id = engine
        .report_error(ReportInput::new("BuildError", "Build failed", Severity::High))
        .unwrap();
    engine.wait_idle().await;

    let first = rx.recv().await.unwrap();
    assert_eq!(first.name(), "error_reported");
    assert_eq!(first.report().unwrap().id, id);
    let second = rx.recv().await.unwrap();
    assert_eq!(second.name(), "fix_applied");
}

/// Sink whose downstream webhook is down when a fix lands
struct FailsOnFixApplied;

impl NotificationSink for FailsOnFixApplied {
    fn notify(&self, event: &RemediationEvent) {
        if let RemediationEvent::FixApplied { .. } = event {
            panic!("webhook returned 502");
        }
    }
}

#[tokio::test]
async fn test_panicking_sink_does_not_change_outcome() {
    let runner = Arc::new(MockRunner::succeeding());
    let sink = Arc::new(RecordingSink::default());
    let engine = RemediationEngine::builder(test_config())
        .command_runner(runner)
        .code_editor(Arc::new(DryRunCodeEditor))
        .sink(Arc::new(FailsOnFixApplied))
        .sink(sink.clone())
        .build()
        .unwrap();

    let id = engine
        .report_error(ReportInput::new(
            "DependencyError",
            "Cannot find module 'x'",
            Severity::High,
        ))
        .unwrap();
    engine.wait_idle().await;

    assert_eq!(engine.get_report(id).unwrap().status, ReportStatus::Fixed);
    assert_eq!(sink.names(), vec!["error_reported", "fix_applied"]);

    let health = engine.get_health();
    assert_eq!(health.active_errors, 0);
    assert_eq!(health.fixed_errors, 1);
    assert_eq!(health.failed_errors, 0);

    let record = engine.get_learning_snapshot().remove("DependencyError").unwrap();
    assert_eq!(record.successes(), 1);
}
