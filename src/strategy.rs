//! Strategy Dispatcher
//!
//! Turns a classified report into a [`FixSuggestion`]. Category tags are
//! folded into a closed [`ErrorCategory`], each category maps to exactly one
//! [`Strategy`], and every strategy knows its static prior and how to build
//! its plan. The dispatcher never executes anything, so it is safe to call
//! speculatively (the `suggest` CLI command does exactly that).
//!
//! Report text is untrusted. Values taken from it are limited to package-name
//! or path characters where possible and always shell-quoted before they land
//! in a command.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::classifier::RootCause;
use crate::config::{BlendMode, StrategyConfig};
use crate::learning::LearningStore;
use crate::report::{ErrorReport, Severity};

/// Known error families; anything else is `Other`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Dependency,
    Syntax,
    Network,
    Permission,
    Deployment,
    Resource,
    Other(String),
}

impl ErrorCategory {
    /// Map a free-form category tag onto a known family
    pub fn from_tag(tag: &str) -> Self {
        let normalized: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "dependencyerror" | "modulenotfounderror" | "importerror" | "dependency"
            | "missingdependency" => ErrorCategory::Dependency,
            "syntaxerror" | "parseerror" | "indentationerror" | "syntax" | "linterror" => {
                ErrorCategory::Syntax
            }
            "networkerror" | "connectionerror" | "timeouterror" | "fetcherror" | "network" => {
                ErrorCategory::Network
            }
            "permissionerror" | "accessdenied" | "eacces" | "permission" => {
                ErrorCategory::Permission
            }
            "deploymenterror" | "builderror" | "deployerror" | "deployment" | "build" => {
                ErrorCategory::Deployment
            }
            "resourceerror" | "memoryerror" | "outofmemory" | "diskfullerror" | "resource" => {
                ErrorCategory::Resource
            }
            _ => ErrorCategory::Other(tag.to_string()),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            ErrorCategory::Dependency => Strategy::DependencyResolution,
            ErrorCategory::Syntax => Strategy::SyntaxCorrection,
            ErrorCategory::Network => Strategy::NetworkRepair,
            ErrorCategory::Permission => Strategy::PermissionRepair,
            ErrorCategory::Deployment => Strategy::DeploymentRepair,
            ErrorCategory::Resource => Strategy::ResourceCleanup,
            ErrorCategory::Other(_) => Strategy::Generic,
        }
    }
}

/// Closed set of remediation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    DependencyResolution,
    SyntaxCorrection,
    NetworkRepair,
    PermissionRepair,
    DeploymentRepair,
    ResourceCleanup,
    Generic,
}

impl Strategy {
    pub const ALL: [Strategy; 7] = [
        Strategy::DependencyResolution,
        Strategy::SyntaxCorrection,
        Strategy::NetworkRepair,
        Strategy::PermissionRepair,
        Strategy::DeploymentRepair,
        Strategy::ResourceCleanup,
        Strategy::Generic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DependencyResolution => "dependency_resolution",
            Strategy::SyntaxCorrection => "syntax_correction",
            Strategy::NetworkRepair => "network_repair",
            Strategy::PermissionRepair => "permission_repair",
            Strategy::DeploymentRepair => "deployment_repair",
            Strategy::ResourceCleanup => "resource_cleanup",
            Strategy::Generic => "generic",
        }
    }

    /// Static confidence before any learning; higher for more mechanical fixes
    pub fn prior(&self) -> f32 {
        match self {
            Strategy::DependencyResolution => 0.85,
            Strategy::PermissionRepair => 0.75,
            Strategy::SyntaxCorrection => 0.7,
            Strategy::DeploymentRepair => 0.65,
            Strategy::NetworkRepair => 0.6,
            Strategy::ResourceCleanup => 0.6,
            Strategy::Generic => 0.3,
        }
    }

    fn estimated_duration_ms(&self) -> u64 {
        match self {
            Strategy::DependencyResolution => 30_000,
            Strategy::SyntaxCorrection => 5_000,
            Strategy::NetworkRepair => 15_000,
            Strategy::PermissionRepair => 2_000,
            Strategy::DeploymentRepair => 120_000,
            Strategy::ResourceCleanup => 10_000,
            Strategy::Generic => 60_000,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .iter()
            .copied()
            .find(|st| st.name() == s.trim())
            .ok_or_else(|| format!("unknown strategy '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Priority::Low,
            Severity::Medium => Priority::Medium,
            Severity::High => Priority::High,
            Severity::Critical => Priority::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    /// Replace lines `start_line..=end_line` with `replacement`
    Replace,
    /// Insert `replacement` before `start_line`
    Insert,
    /// Remove lines `start_line..=end_line`
    Delete,
}

/// A proposed edit to an explicit file/line range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEdit {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub replacement: String,
    pub kind: EditKind,
}

/// A proposed, not-yet-applied remediation plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub description: String,
    pub strategy: String,
    pub confidence: f32,
    pub priority: Priority,
    pub code_edits: Vec<CodeEdit>,
    pub commands: Vec<String>,
    pub rollback: Option<Vec<String>>,
    pub estimated_duration_ms: u64,
}

/// Tunable blending of static priors with learned success rates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidencePolicy {
    pub threshold: f32,
    pub blend: BlendMode,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            blend: BlendMode::Multiply,
        }
    }
}

impl ConfidencePolicy {
    /// Learned rates at or below the threshold are ignored
    pub fn score(&self, prior: f32, learned_rate: Option<f64>) -> f32 {
        let blended = match learned_rate {
            Some(rate) if rate as f32 > self.threshold => match self.blend {
                BlendMode::Multiply => prior * rate as f32,
                BlendMode::Average => (prior + rate as f32) / 2.0,
            },
            _ => prior,
        };
        blended.clamp(0.0, 1.0)
    }
}

fn module_name_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r#"(?i)cannot find module ['"]([@A-Za-z0-9_./\-]+)['"]"#)
                .expect("module regex"),
            Regex::new(r#"(?i)no module named ['"]?([A-Za-z0-9_.\-]+)['"]?"#)
                .expect("module regex"),
            Regex::new(r#"(?i)module not found:.*?['"]([@A-Za-z0-9_./\-]+)['"]"#)
                .expect("module regex"),
        ]
    })
}

/// Extract the missing package from a dependency error, ignoring relative imports
pub fn missing_module(message: &str) -> Option<String> {
    module_name_patterns()
        .iter()
        .filter_map(|re| re.captures(message))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .find(|name| !name.starts_with(['.', '/', '-']))
}

/// Quote a value for `sh -c`; `None` when it cannot be quoted (NUL bytes)
fn shell_arg(value: &str) -> Option<String> {
    shlex::try_quote(value).ok().map(|quoted| quoted.into_owned())
}

/// Quoted path argument; a leading `-` is anchored so it cannot read as a flag
fn path_arg(path: &str) -> Option<String> {
    if path.starts_with('-') {
        shell_arg(&format!("./{}", path))
    } else {
        shell_arg(path)
    }
}

pub struct StrategyDispatcher {
    config: StrategyConfig,
    policy: ConfidencePolicy,
    learning: Arc<LearningStore>,
}

impl StrategyDispatcher {
    pub fn new(config: StrategyConfig, learning: Arc<LearningStore>) -> Self {
        let policy = ConfidencePolicy {
            threshold: config.confidence_threshold,
            blend: config.blend,
        };
        Self {
            config,
            policy,
            learning,
        }
    }

    /// Strategy for a report: a known hinted strategy wins over the category mapping
    pub fn select(&self, report: &ErrorReport) -> Strategy {
        report
            .hints
            .as_ref()
            .and_then(|h| h.preferred_strategy.as_deref())
            .and_then(|s| s.parse::<Strategy>().ok())
            .unwrap_or_else(|| ErrorCategory::from_tag(&report.category).strategy())
    }

    /// `None` when the strategy is disabled or its confidence is below the floor
    pub fn suggest(&self, report: &ErrorReport, root_cause: &RootCause) -> Option<FixSuggestion> {
        let strategy = self.select(report);

        if self.config.disabled.iter().any(|d| d == strategy.name()) {
            debug!(strategy = %strategy, "Strategy disabled by configuration");
            return None;
        }

        let learned_rate = self.learning.lookup(&report.category).map(|r| r.success_rate);
        let confidence = self.policy.score(strategy.prior(), learned_rate);
        if confidence < self.config.min_confidence {
            debug!(
                strategy = %strategy,
                confidence = confidence,
                floor = self.config.min_confidence,
                "Suggestion below confidence floor"
            );
            return None;
        }

        let mut suggestion = self.build(strategy, report, root_cause);
        suggestion.confidence = confidence;
        Some(suggestion)
    }

    fn build(&self, strategy: Strategy, report: &ErrorReport, root_cause: &RootCause) -> FixSuggestion {
        let pm = self.config.package_manager.as_str();
        let priority = Priority::from(report.severity);
        let file = report.location.as_ref().and_then(|l| path_arg(&l.file));

        let (description, code_edits, commands, rollback) = match strategy {
            Strategy::DependencyResolution => match missing_module(&report.message)
                .and_then(|m| shell_arg(&m).map(|quoted| (m, quoted)))
            {
                Some((module, quoted)) => (
                    format!("Install missing dependency '{}'", module),
                    Vec::new(),
                    vec![format!("{} install {}", pm, quoted)],
                    Some(vec![format!("{} uninstall {}", pm, quoted)]),
                ),
                None => (
                    "Reinstall project dependencies".to_string(),
                    Vec::new(),
                    vec![format!("{} install", pm)],
                    None,
                ),
            },
            Strategy::SyntaxCorrection => {
                let mut edits = Vec::new();
                if let (Some(loc), Some(replacement)) = (
                    report.location.as_ref(),
                    report.hints.as_ref().and_then(|h| h.replacement.clone()),
                ) {
                    edits.push(CodeEdit {
                        file: loc.file.clone(),
                        start_line: loc.line,
                        end_line: loc.line,
                        replacement,
                        kind: EditKind::Replace,
                    });
                }
                let commands = match &file {
                    Some(f) => vec![format!("npx eslint --fix {}", f)],
                    None => vec!["npx eslint --fix .".to_string()],
                };
                (
                    format!("Correct syntax ({})", root_cause.label),
                    edits,
                    commands,
                    file.as_ref().map(|f| vec![format!("git checkout -- {}", f)]),
                )
            }
            Strategy::NetworkRepair => (
                "Reset network-facing caches and registry configuration".to_string(),
                Vec::new(),
                vec![
                    format!("{} cache clean --force", pm),
                    format!("{} config set registry https://registry.npmjs.org/", pm),
                ],
                None,
            ),
            Strategy::PermissionRepair => {
                let target = file.clone().unwrap_or_else(|| ".".to_string());
                (
                    format!("Restore read/write permissions on {}", target),
                    Vec::new(),
                    vec![format!("chmod -R u+rw {}", target)],
                    None,
                )
            }
            Strategy::DeploymentRepair => (
                "Clean reinstall and rebuild".to_string(),
                Vec::new(),
                vec![format!("{} ci", pm), format!("{} run build", pm)],
                Some(vec!["git checkout -- .".to_string()]),
            ),
            Strategy::ResourceCleanup => (
                "Free caches and temporary build artifacts".to_string(),
                Vec::new(),
                vec![
                    format!("{} cache clean --force", pm),
                    "rm -rf node_modules/.cache".to_string(),
                ],
                None,
            ),
            Strategy::Generic => (
                format!("Generic remediation for {}", report.category),
                Vec::new(),
                vec![format!("{} run lint -- --fix", pm)],
                None,
            ),
        };

        FixSuggestion {
            description,
            strategy: strategy.name().to_string(),
            confidence: strategy.prior(),
            priority,
            code_edits,
            commands,
            rollback,
            estimated_duration_ms: strategy.estimated_duration_ms(),
        }
    }
}
