//! Remediation queue
//!
//! FIFO of pending reports plus the `processing` flag, both behind one lock so
//! that "push and maybe start a consumer" and "pop or go idle" can never
//! interleave. At most one consumer exists at a time; it is started by the
//! push that finds the queue idle and exits when it finds the queue empty.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Notify;

use crate::report::{ErrorReport, ReportId, ReportStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub is_processing: bool,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<ErrorReport>,
    processing: bool,
    in_flight: Option<ErrorReport>,
    history: VecDeque<ErrorReport>,
}

impl QueueState {
    fn push_history(&mut self, report: ErrorReport, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back(report);
    }
}

pub struct RemediationQueue {
    state: Mutex<QueueState>,
    idle: Notify,
    history_limit: usize,
}

impl RemediationQueue {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            idle: Notify::new(),
            history_limit,
        }
    }

    /// Enqueue; returns `true` when the caller must start the consumer
    pub fn push(&self, report: ErrorReport) -> bool {
        let mut state = self.state.lock();
        state.pending.push_back(report);
        if state.processing {
            false
        } else {
            state.processing = true;
            true
        }
    }

    /// Next report for the consumer, marked in flight. `None` releases the
    /// processing flag and wakes idle waiters.
    pub fn next(&self) -> Option<ErrorReport> {
        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(mut report) => {
                report.status = ReportStatus::Processing;
                state.in_flight = Some(report.clone());
                Some(report)
            }
            None => {
                state.processing = false;
                drop(state);
                self.idle.notify_waiters();
                None
            }
        }
    }

    /// Record a processed report and clear the in-flight slot
    pub fn complete(&self, report: ErrorReport) {
        let mut state = self.state.lock();
        state.in_flight = None;
        state.push_history(report, self.history_limit);
    }

    /// Remove a still-queued report; in-flight reports are not affected
    pub fn cancel(&self, id: ReportId) -> Option<ErrorReport> {
        let mut state = self.state.lock();
        let pos = state.pending.iter().position(|r| r.id == id)?;
        let mut report = state.pending.remove(pos)?;
        report.status = ReportStatus::Cancelled;
        state.push_history(report.clone(), self.history_limit);
        Some(report)
    }

    /// Current view of a report, wherever it is
    pub fn get(&self, id: ReportId) -> Option<ErrorReport> {
        let state = self.state.lock();
        state
            .pending
            .iter()
            .chain(state.in_flight.iter())
            .chain(state.history.iter().rev())
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.state.lock();
        QueueStatus {
            queue_length: state.pending.len(),
            is_processing: state.processing,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.state.lock().processing
    }

    pub fn history(&self) -> Vec<ErrorReport> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Resolve once nothing is queued or in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.state.lock();
                if !state.processing && state.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}
