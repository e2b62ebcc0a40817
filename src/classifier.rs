//! Root-Cause Classifier
//!
//! Maps a report to a human-readable cause label. Rules are tried in order and
//! the first match wins, so specific patterns must come before generic ones.
//! When nothing matches, the learning store is consulted for the report's
//! category before giving up with an explicit "unknown" label.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::errors::RemedyError;
use crate::learning::LearningStore;
use crate::report::ErrorReport;

pub const UNKNOWN_ROOT_CAUSE: &str = "unknown - requires manual investigation";

/// Where a root-cause label came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CauseSource {
    /// A pattern rule matched the message
    Rule { rule: String },
    /// No rule matched; the category has a strategy that worked before
    Learned { strategy: String },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCause {
    pub label: String,
    #[serde(flatten)]
    pub source: CauseSource,
}

impl RootCause {
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_ROOT_CAUSE.to_string(),
            source: CauseSource::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.source, CauseSource::Unknown)
    }
}

/// One ordered pattern rule
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: String,
    pub pattern: Regex,
    pub label: String,
}

impl ClassificationRule {
    pub fn new(name: &str, pattern: &str, label: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
            label: label.to_string(),
        })
    }
}

fn default_rules() -> Vec<ClassificationRule> {
    // (name, pattern, label); order matters
    const RULES: &[(&str, &str, &str)] = &[
        (
            "missing_dependency",
            r"(?i)cannot find module|module not found|no module named|cannot resolve dependency|unresolved import",
            "Missing dependency",
        ),
        (
            "syntax",
            r"(?i)syntaxerror|unexpected token|unexpected end of (input|file)|invalid syntax|indentationerror",
            "Syntax error in source code",
        ),
        (
            "permission",
            r"(?i)eacces|eperm|permission denied|operation not permitted|access is denied",
            "Insufficient permissions",
        ),
        (
            "network",
            r"(?i)econnrefused|econnreset|etimedout|enotfound|getaddrinfo|socket hang up|network (is )?unreachable",
            "Network connectivity issue",
        ),
        (
            "resource",
            r"(?i)out of memory|heap out of memory|enomem|enospc|no space left|too many open files",
            "Resource exhaustion",
        ),
        (
            "deployment",
            r"(?i)deploy(ment)? failed|build failed|exited with code [1-9]|failed to compile",
            "Deployment or build configuration issue",
        ),
        (
            "type",
            r"(?i)typeerror|is not a function|undefined is not|cannot read propert(y|ies) of (undefined|null)",
            "Type mismatch or null reference",
        ),
    ];

    RULES
        .iter()
        .map(|(name, pattern, label)| {
            ClassificationRule::new(name, pattern, label).expect("built-in classifier rule")
        })
        .collect()
}

pub struct RootCauseClassifier {
    rules: Vec<ClassificationRule>,
    learning: Arc<LearningStore>,
}

impl RootCauseClassifier {
    pub fn new(learning: Arc<LearningStore>) -> Self {
        Self {
            rules: default_rules(),
            learning,
        }
    }

    /// Built-in rules preceded by the configured extra rules
    pub fn from_config(
        config: &ClassifierConfig,
        learning: Arc<LearningStore>,
    ) -> Result<Self, RemedyError> {
        let mut rules = Vec::with_capacity(config.extra_rules.len() + 8);
        for (i, rule) in config.extra_rules.iter().enumerate() {
            let compiled = ClassificationRule::new(&format!("custom_{}", i), &rule.pattern, &rule.label)
                .map_err(|e| {
                    RemedyError::Config(format!("invalid classifier rule '{}': {}", rule.label, e))
                })?;
            rules.push(compiled);
        }
        rules.extend(default_rules());
        Ok(Self { rules, learning })
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Never fails; an unmatched report resolves to [`UNKNOWN_ROOT_CAUSE`]
    pub fn classify(&self, report: &ErrorReport) -> RootCause {
        if let Some(rule) = self.rules.iter().find(|r| r.pattern.is_match(&report.message)) {
            debug!(rule = %rule.name, "Classified by rule");
            return RootCause {
                label: rule.label.clone(),
                source: CauseSource::Rule {
                    rule: rule.name.clone(),
                },
            };
        }

        if let Some(record) = self.learning.lookup(&report.category) {
            if let Some(strategy) = record.last_successful_strategy() {
                debug!(strategy = strategy, "Classified from learning history");
                return RootCause {
                    label: format!(
                        "Likely resolved by '{}' (learned from {} previous fix{})",
                        strategy,
                        record.successes(),
                        if record.successes() == 1 { "" } else { "es" }
                    ),
                    source: CauseSource::Learned {
                        strategy: strategy.to_string(),
                    },
                };
            }
        }

        RootCause::unknown()
    }
}
