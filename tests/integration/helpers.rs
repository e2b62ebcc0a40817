//! Test helpers and utilities for integration tests

use async_trait::async_trait;
use parking_lot::Mutex;
use remedy::config::Config;
use remedy::errors::ExecutionError;
use remedy::events::{NotificationSink, RemediationEvent};
use remedy::executor::{CommandOutput, CommandRunner, DryRunCodeEditor};
use remedy::RemediationEngine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Engine config with millisecond backoff and no background sampler
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.executor.base_delay_ms = 1;
    config.executor.max_delay_ms = 10;
    config.health.enabled = false;
    config
}

/// Captures every event in delivery order
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RemediationEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<RemediationEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &RemediationEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Runner that records calls and tracks how many run at once
pub struct MockRunner {
    fail: bool,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRunner {
    pub fn succeeding() -> Self {
        Self::new(false, Duration::ZERO)
    }

    pub fn failing() -> Self {
        Self::new(true, Duration::ZERO)
    }

    pub fn new(fail: bool, delay: Duration) -> Self {
        Self {
            fail,
            delay,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecutionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().push(command.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            Err(ExecutionError::CommandFailed {
                command: command.to_string(),
                status: 1,
                stderr: "npm ERR! 404 Not Found".to_string(),
            })
        } else {
            Ok(CommandOutput {
                stdout: "ok".to_string(),
                stderr: String::new(),
            })
        }
    }
}

pub fn build_engine(
    config: Config,
    runner: Arc<MockRunner>,
    sink: Arc<RecordingSink>,
) -> RemediationEngine {
    RemediationEngine::builder(config)
        .command_runner(runner)
        .code_editor(Arc::new(DryRunCodeEditor))
        .sink(sink)
        .build()
        .expect("engine builds")
}
