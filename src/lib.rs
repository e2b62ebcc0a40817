//! remedy - Autonomous Error Remediation Engine
//!
//! Ingests structured error reports, classifies their root cause, applies a
//! remediation strategy with bounded retries and learns from every outcome.
//!
//! - **Queue**: single-consumer FIFO; at most one report in flight
//! - **Classifier**: ordered pattern rules with a learned fallback
//! - **Strategies**: closed set with static priors blended with history
//! - **Executor**: code edits and commands under a retry state machine
//! - **Health**: periodic host and pipeline snapshots
//!
//! # Quick Start
//!
//! ```ignore
//! use remedy::{Config, RemediationEngine, ReportInput, Severity};
//!
//! let engine = RemediationEngine::builder(Config::load(None)?).build()?;
//! engine.start()?;
//! engine.report_error(ReportInput::new(
//!     "DependencyError",
//!     "Cannot find module 'lodash'",
//!     Severity::High,
//! ))?;
//! engine.wait_idle().await;
//! ```

// ─── Pipeline ──────────────────────────────────────────────────────
pub mod classifier;
pub mod engine;
pub mod executor;
pub mod learning;
pub mod processor;
pub mod queue;
pub mod strategy;

// ─── Data & events ─────────────────────────────────────────────────
pub mod events;
pub mod health;
pub mod report;

// ─── Infrastructure ────────────────────────────────────────────────
pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod observability;

pub use config::Config;
pub use engine::{RemediationEngine, RemediationEngineBuilder};
pub use errors::{RemedyError, Result};
pub use events::{NotificationSink, RemediationEvent};
pub use report::{ErrorReport, ReportId, ReportInput, ReportStatus, Severity};
