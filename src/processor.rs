//! Remediation processor
//!
//! The single queue consumer. For each report: classify, suggest, apply,
//! record the outcome, emit the lifecycle event. Each report's pipeline runs in
//! its own task that the consumer awaits, so a panicking collaborator costs
//! that one report and the consumer moves on.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, Instrument};

use crate::classifier::RootCauseClassifier;
use crate::errors::ExecutionError;
use crate::events::{EventBus, RemediationEvent};
use crate::executor::FixExecutor;
use crate::health::RemediationCounters;
use crate::learning::LearningStore;
use crate::observability::telemetry::{record_outcome, report_span, safe_field};
use crate::queue::RemediationQueue;
use crate::report::{ErrorReport, ReportStatus};
use crate::strategy::StrategyDispatcher;

pub struct RemediationProcessor {
    classifier: Arc<RootCauseClassifier>,
    dispatcher: Arc<StrategyDispatcher>,
    executor: Arc<FixExecutor>,
    learning: Arc<LearningStore>,
    events: Arc<EventBus>,
    counters: Arc<RemediationCounters>,
    queue: Arc<RemediationQueue>,
}

impl RemediationProcessor {
    pub fn new(
        classifier: Arc<RootCauseClassifier>,
        dispatcher: Arc<StrategyDispatcher>,
        executor: Arc<FixExecutor>,
        learning: Arc<LearningStore>,
        events: Arc<EventBus>,
        counters: Arc<RemediationCounters>,
        queue: Arc<RemediationQueue>,
    ) -> Self {
        Self {
            classifier,
            dispatcher,
            executor,
            learning,
            events,
            counters,
            queue,
        }
    }

    /// Drain the queue until it is empty; only one drain runs at a time
    pub async fn drain(self: Arc<Self>) {
        while let Some(report) = self.queue.next() {
            let span = report_span(
                &report.id.to_string(),
                &report.category,
                &report.severity.to_string(),
            );
            let fallback = report.clone();
            let pipeline = Arc::clone(&self);
            let handle = tokio::spawn(async move { pipeline.process(report).await }.instrument(span));

            let done = match handle.await {
                Ok(done) => done,
                Err(join_err) => self.fail_crashed(fallback, join_err),
            };
            self.queue.complete(done);
        }
    }

    /// Full pipeline for one in-flight report
    pub async fn process(&self, mut report: ErrorReport) -> ErrorReport {
        let root_cause = self.classifier.classify(&report);
        report.root_cause = Some(root_cause.label.clone());

        let Some(suggestion) = self.dispatcher.suggest(&report, &root_cause) else {
            report.status = ReportStatus::NoFix;
            self.counters.report_finished(false, None);
            record_outcome("none", "no_fix");
            self.events.publish(RemediationEvent::NoFixAvailable {
                report: report.clone(),
            });
            return report;
        };

        let attempt = self.executor.apply(&report, &suggestion).await;

        self.learning.record_outcome(
            &report.category,
            &attempt.strategy,
            attempt.success,
            Duration::from_millis(attempt.duration_ms),
        );
        self.learning.flush().await;
        self.counters
            .report_finished(attempt.success, Some(attempt.duration_ms));

        report.retry_count = attempt.iterations.saturating_sub(1);
        report.attempts.push(attempt.clone());

        if attempt.success {
            report.status = ReportStatus::Fixed;
            record_outcome(&attempt.strategy, "fixed");
            self.events.publish(RemediationEvent::FixApplied {
                report: report.clone(),
                suggestion,
                attempt,
            });
        } else {
            report.status = ReportStatus::Failed;
            record_outcome(&attempt.strategy, "failed");
            let error = attempt
                .error
                .clone()
                .unwrap_or_else(|| "fix attempt failed".to_string());
            self.events.publish(RemediationEvent::ProcessingError {
                report: report.clone(),
                error,
            });
        }
        report
    }

    fn fail_crashed(&self, mut report: ErrorReport, join_err: tokio::task::JoinError) -> ErrorReport {
        let message = if join_err.is_panic() {
            let payload = join_err.into_panic();
            payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string())
        } else {
            "remediation task cancelled".to_string()
        };
        let err = ExecutionError::Panic(message);

        error!(report_id = %report.id, error = %safe_field(&err.to_string()), "Remediation task crashed");

        report.status = ReportStatus::Failed;
        self.counters.report_finished(false, None);
        self.events.publish(RemediationEvent::ProcessingError {
            report: report.clone(),
            error: err.to_string(),
        });
        report
    }
}
