//! Error reports and the audit trail attached to them
//!
//! An [`ErrorReport`] is created on ingestion, mutated only by the processor
//! while it is in flight, and frozen once processing finishes. Every
//! remediation run appends one [`FixAttempt`], which in turn owns the
//! [`AppliedChange`] records for each edit and command executed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::IngestError;

/// Server-generated report identifier
pub type ReportId = Uuid;

/// Declared severity of a reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" | "med" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" | "crit" => Ok(Severity::Critical),
            other => Err(IngestError::InvalidSeverity(other.to_string())),
        }
    }
}

/// Where in the source the error was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Optional caller-provided hints that steer strategy selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningHints {
    /// Strategy the reporter believes applies (e.g. "permission_repair")
    #[serde(default)]
    pub preferred_strategy: Option<String>,
    /// Replacement text for the reported source line
    #[serde(default)]
    pub replacement: Option<String>,
}

/// Lifecycle of a report inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Queued,
    Processing,
    Fixed,
    Failed,
    NoFix,
    Cancelled,
}

impl ReportStatus {
    /// Whether the report has left the queue for good
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Queued | ReportStatus::Processing)
    }
}

/// A single reported fault awaiting (or having received) remediation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub id: ReportId,
    pub category: String,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub stack: Option<String>,
    pub severity: Severity,
    pub submitted_at: DateTime<Utc>,
    pub retry_count: u32,
    pub attempts: Vec<FixAttempt>,
    pub root_cause: Option<String>,
    pub hints: Option<LearningHints>,
    pub status: ReportStatus,
}

impl ErrorReport {
    pub fn new(category: &str, message: &str, severity: Severity) -> Self {
        Self {
            id: Uuid::nil(),
            category: category.to_string(),
            message: message.to_string(),
            location: None,
            stack: None,
            severity,
            submitted_at: Utc::now(),
            retry_count: 0,
            attempts: Vec::new(),
            root_cause: None,
            hints: None,
            status: ReportStatus::Queued,
        }
    }

    pub fn with_location(mut self, file: &str, line: u32, column: u32) -> Self {
        self.location = Some(SourceLocation {
            file: file.to_string(),
            line,
            column,
        });
        self
    }

    pub fn with_stack(mut self, stack: &str) -> Self {
        self.stack = Some(stack.to_string());
        self
    }

    pub fn with_hints(mut self, hints: LearningHints) -> Self {
        self.hints = Some(hints);
        self
    }

    /// Reject reports that cannot be classified at all
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.category.trim().is_empty() {
            return Err(IngestError::MissingField { field: "category" });
        }
        if self.message.trim().is_empty() {
            return Err(IngestError::MissingField { field: "message" });
        }
        Ok(())
    }

    /// Most recent attempt, if any
    pub fn last_attempt(&self) -> Option<&FixAttempt> {
        self.attempts.last()
    }
}

/// Wire shape accepted by the ingestion API and the `run` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInput {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub location: Option<SourceLocation>,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub hints: Option<LearningHints>,
}

impl ReportInput {
    pub fn new(category: &str, message: &str, severity: Severity) -> Self {
        Self {
            category: category.to_string(),
            message: message.to_string(),
            severity,
            location: None,
            stack: None,
            hints: None,
        }
    }

    pub fn into_report(self) -> ErrorReport {
        let mut report = ErrorReport::new(&self.category, &self.message, self.severity);
        report.location = self.location;
        report.stack = self.stack;
        report.hints = self.hints;
        report
    }
}

/// Kind of side effect an applied change had
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Code,
    Configuration,
    Dependency,
    SystemCommand,
}

/// One atomic edit or command executed as part of an attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub kind: ChangeKind,
    pub target: String,
    pub action: String,
    pub details: String,
    pub success: bool,
    /// Retry iteration (1-based) that produced this change
    pub iteration: u32,
}

/// One executed application of a fix suggestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAttempt {
    pub id: Uuid,
    pub strategy: String,
    pub description: String,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
    pub iterations: u32,
    pub changes: Vec<AppliedChange>,
}

impl FixAttempt {
    /// Changes produced by a given iteration
    pub fn changes_in(&self, iteration: u32) -> impl Iterator<Item = &AppliedChange> {
        self.changes.iter().filter(move |c| c.iteration == iteration)
    }
}
