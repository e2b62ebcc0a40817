//! Remediation engine
//!
//! Owns one queue, one consumer and one health sampler. All collaborators are
//! injected through [`RemediationEngineBuilder`]; nothing is global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classifier::{RootCause, RootCauseClassifier};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::errors::{RemedyError, Result};
use crate::events::{EventBus, NotificationSink, RemediationEvent, TracingSink};
use crate::executor::{
    CodeEditor, CommandRunner, DryRunCodeEditor, DryRunCommandRunner, ExecutorSummary, FixExecutor,
    FsCodeEditor, ShellCommandRunner,
};
use crate::health::{HealthSampler, RemediationCounters, SysinfoProbe, SystemHealthSnapshot, SystemProbe};
use crate::learning::{JsonFileBackend, LearningBackend, LearningRecord, LearningStore};
use crate::processor::RemediationProcessor;
use crate::queue::{QueueStatus, RemediationQueue};
use crate::report::{ErrorReport, ReportId, ReportInput, ReportStatus};
use crate::strategy::{FixSuggestion, StrategyDispatcher};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Builder for [`RemediationEngine`]
pub struct RemediationEngineBuilder {
    config: Config,
    sinks: Vec<Arc<dyn NotificationSink>>,
    runner: Option<Arc<dyn CommandRunner>>,
    editor: Option<Arc<dyn CodeEditor>>,
    clock: Option<Arc<dyn Clock>>,
    probe: Option<Arc<dyn SystemProbe>>,
    backend: Option<Arc<dyn LearningBackend>>,
    dry_run: bool,
    health_interval: Option<Duration>,
}

impl RemediationEngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sinks: Vec::new(),
            runner: None,
            editor: None,
            clock: None,
            probe: None,
            backend: None,
            dry_run: false,
            health_interval: None,
        }
    }

    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn code_editor(mut self, editor: Arc<dyn CodeEditor>) -> Self {
        self.editor = Some(editor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn system_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn learning_backend(mut self, backend: Arc<dyn LearningBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use dry-run collaborators unless a runner or editor was injected
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Health tick period below one second, mainly for tests
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<RemediationEngine> {
        self.config.validate()?;
        let config = self.config;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let backend = self.backend.or_else(|| {
            config
                .learning
                .path
                .as_ref()
                .map(|p| Arc::new(JsonFileBackend::new(p)) as Arc<dyn LearningBackend>)
        });
        let learning = Arc::new(match backend {
            Some(backend) => LearningStore::with_backend(backend, Arc::clone(&clock))?,
            None => LearningStore::new(Arc::clone(&clock)),
        });

        let runner: Arc<dyn CommandRunner> = match self.runner {
            Some(runner) => runner,
            None if self.dry_run => Arc::new(DryRunCommandRunner),
            None => {
                let mut shell =
                    ShellCommandRunner::new(Duration::from_secs(config.executor.command_timeout_secs));
                if let Some(dir) = &config.executor.working_dir {
                    shell = shell.with_working_dir(dir);
                }
                Arc::new(shell)
            }
        };
        let editor: Arc<dyn CodeEditor> = match (self.editor, &config.executor.working_dir) {
            (Some(editor), _) => editor,
            (None, _) if self.dry_run => Arc::new(DryRunCodeEditor),
            (None, Some(dir)) => Arc::new(FsCodeEditor::with_root(dir)),
            (None, None) => Arc::new(FsCodeEditor::new()),
        };

        let mut events = EventBus::new(EVENT_CHANNEL_CAPACITY);
        if self.sinks.is_empty() {
            events = events.with_sink(Arc::new(TracingSink));
        }
        for sink in self.sinks {
            events = events.with_sink(sink);
        }
        let events = Arc::new(events);

        let classifier = Arc::new(RootCauseClassifier::from_config(
            &config.classifier,
            Arc::clone(&learning),
        )?);
        let dispatcher = Arc::new(StrategyDispatcher::new(
            config.strategy.clone(),
            Arc::clone(&learning),
        ));
        let executor = Arc::new(
            FixExecutor::new(&config.executor, runner, editor).with_clock(Arc::clone(&clock)),
        );

        let counters = Arc::new(RemediationCounters::default());
        let queue = Arc::new(RemediationQueue::new(config.queue.history_limit));
        let processor = Arc::new(RemediationProcessor::new(
            Arc::clone(&classifier),
            Arc::clone(&dispatcher),
            Arc::clone(&executor),
            Arc::clone(&learning),
            Arc::clone(&events),
            Arc::clone(&counters),
            Arc::clone(&queue),
        ));

        let probe = self.probe.unwrap_or_else(|| Arc::new(SysinfoProbe::new()));
        let mut health = HealthSampler::new(
            &config.health,
            probe,
            Arc::clone(&counters),
            Arc::clone(&clock),
            Arc::clone(&events),
        );
        if let Some(interval) = self.health_interval {
            health = health.with_interval(interval);
        }

        debug!(
            max_retries = config.executor.max_retries,
            threshold = config.strategy.confidence_threshold,
            "Remediation engine built"
        );

        Ok(RemediationEngine {
            config,
            clock,
            learning,
            classifier,
            dispatcher,
            executor,
            events,
            counters,
            queue,
            processor,
            health,
            accepting: AtomicBool::new(true),
        })
    }
}

pub struct RemediationEngine {
    config: Config,
    clock: Arc<dyn Clock>,
    learning: Arc<LearningStore>,
    classifier: Arc<RootCauseClassifier>,
    dispatcher: Arc<StrategyDispatcher>,
    executor: Arc<FixExecutor>,
    events: Arc<EventBus>,
    counters: Arc<RemediationCounters>,
    queue: Arc<RemediationQueue>,
    processor: Arc<RemediationProcessor>,
    health: HealthSampler,
    accepting: AtomicBool,
}

impl RemediationEngine {
    pub fn builder(config: Config) -> RemediationEngineBuilder {
        RemediationEngineBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start background work (the health sampler, when enabled)
    pub fn start(&self) -> Result<()> {
        if self.config.health.enabled {
            self.health.start()?;
        }
        Ok(())
    }

    /// Validate and enqueue a report from its wire shape
    pub fn report_error(&self, input: ReportInput) -> Result<ReportId> {
        self.submit(input.into_report())
    }

    /// Validate, assign an id and enqueue; never waits on processing
    pub fn submit(&self, mut report: ErrorReport) -> Result<ReportId> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(RemedyError::Runtime("engine is shutting down".to_string()));
        }
        report.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            RemedyError::Runtime(format!("report processing needs a tokio runtime: {e}"))
        })?;

        report.id = Uuid::new_v4();
        report.submitted_at = self.clock.now();
        report.status = ReportStatus::Queued;
        report.retry_count = 0;
        report.attempts.clear();
        report.root_cause = None;
        let id = report.id;

        self.counters.report_queued();
        self.events.publish(RemediationEvent::ErrorReported {
            report: report.clone(),
        });

        if self.queue.push(report) {
            let processor = Arc::clone(&self.processor);
            runtime.spawn(processor.drain());
        }
        Ok(id)
    }

    /// Classify and suggest without queueing or executing anything
    pub fn diagnose(&self, report: &ErrorReport) -> (RootCause, Option<FixSuggestion>) {
        let cause = self.classifier.classify(report);
        let suggestion = self.dispatcher.suggest(report, &cause);
        (cause, suggestion)
    }

    /// Latest health snapshot, sampling once if none exists yet
    pub fn get_health(&self) -> SystemHealthSnapshot {
        self.health
            .snapshot()
            .unwrap_or_else(|| self.health.sample_now())
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    pub fn is_processing(&self) -> bool {
        self.queue.is_processing()
    }

    pub fn get_learning_snapshot(&self) -> HashMap<String, LearningRecord> {
        self.learning.snapshot()
    }

    pub fn get_report(&self, id: ReportId) -> Option<ErrorReport> {
        self.queue.get(id)
    }

    /// Attempt and iteration totals across every fix applied so far
    pub fn executor_summary(&self) -> ExecutorSummary {
        self.executor.summary()
    }

    /// Processed reports, oldest first
    pub fn history(&self) -> Vec<ErrorReport> {
        self.queue.history()
    }

    /// Cancel a queued report; returns whether it was removed
    pub fn cancel(&self, id: ReportId) -> bool {
        match self.queue.cancel(id) {
            Some(_) => {
                self.counters.report_cancelled();
                info!(report_id = %id, "Report cancelled");
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemediationEvent> {
        self.events.subscribe()
    }

    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    /// Stop accepting reports, let the queue drain, stop the sampler
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.queue.wait_idle().await;
        self.health.stop().await;
        info!(
            fixed = self.counters.fixed(),
            failed = self.counters.failed(),
            "Remediation engine stopped"
        );
    }
}
