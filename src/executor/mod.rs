//! Fix Executor
//!
//! Applies a [`FixSuggestion`] with bounded retries. Each iteration applies
//! every code edit and then runs every command in order; the first failing
//! step ends the iteration. The retry loop is driven by [`RetryMachine`], an
//! explicit state machine, so the control flow can be tested without touching
//! a runner.
//!
//! An edit that went through in one iteration is not handed to the editor
//! again on a retry. Rollback commands on a suggestion are informational only
//! and are never executed here.

pub mod backoff;
pub mod editor;
pub mod runner;

pub use backoff::Backoff;
pub use editor::{CodeEditor, DryRunCodeEditor, EditOutcome, FsCodeEditor};
pub use runner::{CommandOutput, CommandRunner, DryRunCommandRunner, ShellCommandRunner};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::ExecutorConfig;
use crate::errors::ExecutionError;
use crate::observability::telemetry::{safe_field, track_step};
use crate::report::{AppliedChange, ChangeKind, ErrorReport, FixAttempt};
use crate::strategy::{CodeEdit, EditKind, FixSuggestion};

/// Retry loop states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Attempting {
        iteration: u32,
    },
    Retrying {
        iteration: u32,
        delay: Duration,
        last_error: String,
    },
    Succeeded {
        iteration: u32,
    },
    Failed {
        iterations: u32,
        last_error: String,
    },
}

impl ExecutorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutorState::Succeeded { .. } | ExecutorState::Failed { .. }
        )
    }
}

/// Inputs that move the retry loop forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationEvent {
    Begin,
    Passed,
    Errored(String),
    BackoffElapsed,
}

/// Transition table for the retry loop
#[derive(Debug, Clone, Copy)]
pub struct RetryMachine {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryMachine {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    /// Events that do not apply to the current state leave it unchanged
    pub fn step(&self, state: ExecutorState, event: IterationEvent) -> ExecutorState {
        match (state, event) {
            (ExecutorState::Idle, IterationEvent::Begin) => {
                ExecutorState::Attempting { iteration: 1 }
            }
            (ExecutorState::Attempting { iteration }, IterationEvent::Passed) => {
                ExecutorState::Succeeded { iteration }
            }
            (ExecutorState::Attempting { iteration }, IterationEvent::Errored(last_error)) => {
                if iteration >= self.max_retries {
                    ExecutorState::Failed {
                        iterations: iteration,
                        last_error,
                    }
                } else {
                    ExecutorState::Retrying {
                        iteration,
                        delay: self.backoff.delay(iteration),
                        last_error,
                    }
                }
            }
            (ExecutorState::Retrying { iteration, .. }, IterationEvent::BackoffElapsed) => {
                ExecutorState::Attempting {
                    iteration: iteration + 1,
                }
            }
            (state, _) => state,
        }
    }
}

/// Executor statistics
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub attempts: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub iterations: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSummary {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub iterations: u64,
}

fn command_kind(command: &str) -> ChangeKind {
    let lower = command.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words
        .iter()
        .any(|w| matches!(*w, "install" | "uninstall" | "ci" | "add" | "remove"))
    {
        ChangeKind::Dependency
    } else if lower.contains("config set") || lower.contains("chmod") || lower.contains("chown") {
        ChangeKind::Configuration
    } else {
        ChangeKind::SystemCommand
    }
}

fn edit_action(kind: EditKind) -> &'static str {
    match kind {
        EditKind::Replace => "replace",
        EditKind::Insert => "insert",
        EditKind::Delete => "delete",
    }
}

pub struct FixExecutor {
    runner: Arc<dyn CommandRunner>,
    editor: Arc<dyn CodeEditor>,
    machine: RetryMachine,
    clock: Arc<dyn Clock>,
    stats: ExecutorStats,
}

impl FixExecutor {
    pub fn new(
        config: &ExecutorConfig,
        runner: Arc<dyn CommandRunner>,
        editor: Arc<dyn CodeEditor>,
    ) -> Self {
        Self {
            runner,
            editor,
            machine: RetryMachine::new(config.max_retries, Backoff::from_config(config)),
            clock: Arc::new(SystemClock),
            stats: ExecutorStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Apply a suggestion, retrying with backoff; never returns an error.
    ///
    /// Every edit and command produces an [`AppliedChange`] whether or not it
    /// succeeded. The returned attempt carries the last error when retries are
    /// exhausted.
    pub async fn apply(&self, report: &ErrorReport, suggestion: &FixSuggestion) -> FixAttempt {
        let started = tokio::time::Instant::now();
        let timestamp = self.clock.now();
        let mut changes = Vec::new();
        let mut edits_done = vec![false; suggestion.code_edits.len()];
        let mut state = self.machine.step(ExecutorState::Idle, IterationEvent::Begin);

        self.stats.attempts.fetch_add(1, Ordering::Relaxed);

        while !state.is_terminal() {
            state = match state {
                ExecutorState::Attempting { iteration } => {
                    self.stats.iterations.fetch_add(1, Ordering::Relaxed);
                    debug!(iteration, strategy = %suggestion.strategy, "Fix iteration started");
                    let event = match self
                        .run_iteration(iteration, suggestion, &mut edits_done, &mut changes)
                        .await
                    {
                        Ok(()) => IterationEvent::Passed,
                        Err(e) => IterationEvent::Errored(e.to_string()),
                    };
                    self.machine.step(state, event)
                }
                ExecutorState::Retrying {
                    iteration,
                    delay,
                    ref last_error,
                } => {
                    warn!(
                        report_id = %report.id,
                        iteration,
                        delay_ms = delay.as_millis() as u64,
                        error = %safe_field(last_error),
                        "Fix iteration failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    self.machine.step(state, IterationEvent::BackoffElapsed)
                }
                other => other,
            };
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let (success, iterations, error) = match state {
            ExecutorState::Succeeded { iteration } => (true, iteration, None),
            ExecutorState::Failed {
                iterations,
                last_error,
            } => (false, iterations, Some(last_error)),
            _ => (false, 0, Some("retry loop ended in a non-terminal state".to_string())),
        };

        if success {
            self.stats.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                report_id = %report.id,
                strategy = %suggestion.strategy,
                iterations,
                "Fix failed after exhausting retries"
            );
        }

        FixAttempt {
            id: Uuid::new_v4(),
            strategy: suggestion.strategy.clone(),
            description: suggestion.description.clone(),
            success,
            duration_ms,
            timestamp,
            error,
            iterations,
            changes,
        }
    }

    async fn run_iteration(
        &self,
        iteration: u32,
        suggestion: &FixSuggestion,
        edits_done: &mut [bool],
        changes: &mut Vec<AppliedChange>,
    ) -> Result<(), ExecutionError> {
        for (edit, done) in suggestion.code_edits.iter().zip(edits_done.iter_mut()) {
            let result = if *done {
                Ok(EditOutcome::AlreadyApplied)
            } else {
                self.editor.apply(edit).await
            };
            changes.push(Self::edit_change(edit, &result, iteration));
            result?;
            *done = true;
        }

        for command in &suggestion.commands {
            let result = track_step(command, || self.runner.run(command)).await;
            let (success, details) = match &result {
                Ok(out) => (true, out.stdout.trim().to_string()),
                Err(e) => (false, e.to_string()),
            };
            changes.push(AppliedChange {
                kind: command_kind(command),
                target: command.clone(),
                action: "run_command".to_string(),
                details,
                success,
                iteration,
            });
            result?;
        }

        Ok(())
    }

    fn edit_change(
        edit: &CodeEdit,
        result: &Result<EditOutcome, ExecutionError>,
        iteration: u32,
    ) -> AppliedChange {
        let (success, details) = match result {
            Ok(EditOutcome::Applied) => (true, "applied".to_string()),
            Ok(EditOutcome::AlreadyApplied) => (true, "already applied".to_string()),
            Err(e) => (false, e.to_string()),
        };
        AppliedChange {
            kind: ChangeKind::Code,
            target: format!("{}:{}-{}", edit.file, edit.start_line, edit.end_line),
            action: edit_action(edit.kind).to_string(),
            details,
            success,
            iteration,
        }
    }

    pub fn summary(&self) -> ExecutorSummary {
        ExecutorSummary {
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            successes: self.stats.successes.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            iterations: self.stats.iterations.load(Ordering::Relaxed),
        }
    }
}
