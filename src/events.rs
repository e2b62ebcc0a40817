//! Lifecycle events
//!
//! Every event goes to two places: a tokio broadcast channel for in-process
//! subscribers and the injected [`NotificationSink`]s. Lagging broadcast
//! receivers miss events; sinks see every one, in order. A sink that panics
//! is logged and skipped for that event and never unwinds into the publisher.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::health::SystemHealthSnapshot;
use crate::observability::telemetry::safe_field;
use crate::report::{ErrorReport, FixAttempt};
use crate::strategy::FixSuggestion;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RemediationEvent {
    ErrorReported {
        report: ErrorReport,
    },
    FixApplied {
        report: ErrorReport,
        suggestion: FixSuggestion,
        attempt: FixAttempt,
    },
    NoFixAvailable {
        report: ErrorReport,
    },
    ProcessingError {
        report: ErrorReport,
        error: String,
    },
    HealthUpdate {
        snapshot: SystemHealthSnapshot,
    },
}

impl RemediationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RemediationEvent::ErrorReported { .. } => "error_reported",
            RemediationEvent::FixApplied { .. } => "fix_applied",
            RemediationEvent::NoFixAvailable { .. } => "no_fix_available",
            RemediationEvent::ProcessingError { .. } => "processing_error",
            RemediationEvent::HealthUpdate { .. } => "health_update",
        }
    }

    /// Report the event concerns, if any
    pub fn report(&self) -> Option<&ErrorReport> {
        match self {
            RemediationEvent::ErrorReported { report }
            | RemediationEvent::FixApplied { report, .. }
            | RemediationEvent::NoFixAvailable { report }
            | RemediationEvent::ProcessingError { report, .. } => Some(report),
            RemediationEvent::HealthUpdate { .. } => None,
        }
    }
}

/// Outbound notification boundary; implementations must not block
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &RemediationEvent);
}

/// Writes every event to the log
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &RemediationEvent) {
        match event {
            RemediationEvent::ErrorReported { report } => info!(
                report_id = %report.id,
                category = %safe_field(&report.category),
                severity = %report.severity,
                "Error reported"
            ),
            RemediationEvent::FixApplied {
                report, attempt, ..
            } => info!(
                report_id = %report.id,
                strategy = %attempt.strategy,
                iterations = attempt.iterations,
                "Fix applied"
            ),
            RemediationEvent::NoFixAvailable { report } => warn!(
                report_id = %report.id,
                category = %safe_field(&report.category),
                "No fix available"
            ),
            RemediationEvent::ProcessingError { report, error } => warn!(
                report_id = %report.id,
                error = %safe_field(error),
                "Remediation failed"
            ),
            RemediationEvent::HealthUpdate { snapshot } => debug!(
                cpu = snapshot.cpu_usage,
                memory = snapshot.memory_usage,
                disk = snapshot.disk_usage,
                active = snapshot.active_errors,
                "Health update"
            ),
        }
    }
}

#[derive(Debug, Default)]
struct EventBusStats {
    published: AtomicU64,
    sink_panics: AtomicU64,
}

/// Fan-out of lifecycle events to subscribers and sinks
pub struct EventBus {
    sender: broadcast::Sender<RemediationEvent>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    stats: EventBusStats,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sinks: Vec::new(),
            stats: EventBusStats::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn publish(&self, event: RemediationEvent) {
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        for (index, sink) in self.sinks.iter().enumerate() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| sink.notify(&event))) {
                self.stats.sink_panics.fetch_add(1, Ordering::Relaxed);
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(
                    sink = index,
                    event = event.name(),
                    error = %safe_field(&message),
                    "Notification sink panicked"
                );
            }
        }
        // No receivers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemediationEvent> {
        self.sender.subscribe()
    }

    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }

    pub fn sink_panics(&self) -> u64 {
        self.stats.sink_panics.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
