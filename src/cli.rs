//! remedy command line
//!
//! Feed error reports through the engine, preview suggestions, sample health.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::RemediationEngine;
use crate::errors::{IngestError, EXIT_REMEDIATION_FAILED, EXIT_SUCCESS};
use crate::events::{NotificationSink, RemediationEvent, TracingSink};
use crate::health::SystemHealthSnapshot;
use crate::observability::telemetry::init_tracing_from_config;
use crate::report::{ErrorReport, LearningHints, ReportId, ReportInput, ReportStatus, Severity};

#[derive(Parser)]
#[command(name = "remedy")]
#[command(about = "Autonomous error remediation: classify, fix, learn, report")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Debug logging (overrides the configured level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Process error reports (JSON lines) and remediate them
    Run {
        /// File with one JSON report per line, or `-` for stdin
        #[arg(value_name = "FILE|-")]
        input: String,

        /// Log commands and edits instead of executing them
        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Classify a single error and show the fix that would be applied
    Suggest {
        #[arg(long)]
        category: String,

        #[arg(long)]
        message: String,

        #[arg(long, default_value = "medium")]
        severity: String,

        /// Source file the error points at
        #[arg(long)]
        file: Option<String>,

        /// Line in `--file`
        #[arg(long, default_value_t = 1)]
        line: u32,

        /// Preferred strategy hint
        #[arg(long)]
        strategy: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Take one health sample
    Health {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Parsed `run` input: reports plus the lines that could not be parsed
#[derive(Debug, Default)]
pub struct ParsedInput {
    pub reports: Vec<ReportInput>,
    pub rejected: Vec<(usize, String)>,
}

/// Parse JSON lines; blank lines and `#` comments are skipped
pub fn parse_reports(content: &str) -> ParsedInput {
    let mut parsed = ParsedInput::default();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<ReportInput>(line) {
            Ok(input) => parsed.reports.push(input),
            Err(e) => parsed.rejected.push((idx + 1, e.to_string())),
        }
    }
    parsed
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub submitted: usize,
    pub rejected: usize,
    pub fixed: usize,
    pub failed: usize,
    pub no_fix: usize,
    pub cancelled: usize,
}

impl RunSummary {
    fn tally(&mut self, status: ReportStatus) {
        match status {
            ReportStatus::Fixed => self.fixed += 1,
            ReportStatus::Failed => self.failed += 1,
            ReportStatus::NoFix => self.no_fix += 1,
            ReportStatus::Cancelled => self.cancelled += 1,
            ReportStatus::Queued | ReportStatus::Processing => {}
        }
    }

    pub fn all_fixed(&self) -> bool {
        self.failed == 0 && self.no_fix == 0 && self.cancelled == 0
    }
}

/// Final state of every report the consumer finished, kept for the whole run
#[derive(Debug, Default)]
struct OutcomeCollector {
    finished: Mutex<HashMap<ReportId, ErrorReport>>,
}

impl OutcomeCollector {
    fn take(&self, id: ReportId) -> Option<ErrorReport> {
        self.finished.lock().remove(&id)
    }
}

impl NotificationSink for OutcomeCollector {
    fn notify(&self, event: &RemediationEvent) {
        match event {
            RemediationEvent::FixApplied { report, .. }
            | RemediationEvent::NoFixAvailable { report }
            | RemediationEvent::ProcessingError { report, .. } => {
                self.finished.lock().insert(report.id, report.clone());
            }
            RemediationEvent::ErrorReported { .. } | RemediationEvent::HealthUpdate { .. } => {}
        }
    }
}

/// Entry point; returns the process exit code
pub async fn run() -> Result<u8> {
    let cli = Cli::parse();

    let color = !cli.no_color && std::env::var("NO_COLOR").is_err();
    if !color {
        colored::control::set_override(false);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_tracing_from_config(&config.logging, color);

    match cli.command {
        Commands::Run {
            input,
            dry_run,
            format,
        } => run_reports(config, &input, dry_run, format).await,
        Commands::Suggest {
            category,
            message,
            severity,
            file,
            line,
            strategy,
            format,
        } => {
            let severity: Severity = severity.parse()?;
            let mut report = ErrorReport::new(&category, &message, severity);
            report.validate()?;
            if let Some(f) = &file {
                report = report.with_location(f, line, 1);
            }
            if let Some(s) = strategy {
                report = report.with_hints(LearningHints {
                    preferred_strategy: Some(s),
                    replacement: None,
                });
            }
            suggest(config, &report, format)?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Health { format } => {
            let engine = RemediationEngine::builder(config).dry_run(true).build()?;
            print_health(&engine.get_health(), format)?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(EXIT_SUCCESS)
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read reports from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read reports from {}", input))
    }
}

async fn run_reports(config: Config, input: &str, dry_run: bool, format: OutputFormat) -> Result<u8> {
    let parsed = parse_reports(&read_input(input)?);
    for (line, err) in &parsed.rejected {
        eprintln!("{} line {}: {}", "skipped".yellow(), line, err);
    }
    if parsed.reports.is_empty() {
        return Err(IngestError::Malformed(format!(
            "no valid reports in {} ({} rejected)",
            input,
            parsed.rejected.len()
        ))
        .into());
    }

    // History is bounded, so outcomes are collected from events as they happen
    let outcomes = Arc::new(OutcomeCollector::default());
    let engine = RemediationEngine::builder(config)
        .dry_run(dry_run)
        .sink(Arc::new(TracingSink))
        .sink(outcomes.clone())
        .build()?;
    engine.start()?;

    let mut summary = RunSummary {
        rejected: parsed.rejected.len(),
        ..RunSummary::default()
    };
    let mut ids: Vec<ReportId> = Vec::new();
    for report in parsed.reports {
        match engine.report_error(report) {
            Ok(id) => ids.push(id),
            Err(e) => {
                eprintln!("{} {}", "rejected".yellow(), e);
                summary.rejected += 1;
            }
        }
    }
    summary.submitted = ids.len();

    let mut cancelled: HashSet<ReportId> = HashSet::new();
    tokio::select! {
        _ = engine.wait_idle() => {}
        _ = shutdown_signal() => {
            eprintln!("Interrupted, cancelling queued reports...");
            cancelled.extend(ids.iter().copied().filter(|id| engine.cancel(*id)));
            engine.wait_idle().await;
        }
    }
    engine.shutdown().await;

    let mut reports: Vec<ErrorReport> = Vec::with_capacity(ids.len());
    for id in &ids {
        match outcomes.take(*id) {
            Some(report) => {
                summary.tally(report.status);
                reports.push(report);
            }
            None if cancelled.contains(id) => {
                summary.cancelled += 1;
                reports.extend(engine.get_report(*id));
            }
            // Never reached a terminal event
            None => summary.failed += 1,
        }
    }
    let executor = engine.executor_summary();

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "reports": reports,
                "summary": summary,
                "executor": executor,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            for report in &reports {
                print_report_line(report);
            }
            println!(
                "\n{} submitted, {} fixed, {} failed, {} without fix, {} cancelled, {} rejected",
                summary.submitted,
                summary.fixed.to_string().green(),
                summary.failed.to_string().red(),
                summary.no_fix.to_string().yellow(),
                summary.cancelled,
                summary.rejected
            );
            println!(
                "{}",
                format!(
                    "{} fix attempts, {} iterations",
                    executor.attempts, executor.iterations
                )
                .dimmed()
            );
        }
    }

    Ok(if summary.all_fixed() {
        EXIT_SUCCESS
    } else {
        EXIT_REMEDIATION_FAILED
    })
}

fn print_report_line(report: &ErrorReport) {
    let (mark, status) = match report.status {
        ReportStatus::Fixed => ("✓".green(), "fixed".green()),
        ReportStatus::Failed => ("✗".red(), "failed".red()),
        ReportStatus::NoFix => ("-".yellow(), "no fix".yellow()),
        ReportStatus::Cancelled => ("-".dimmed(), "cancelled".dimmed()),
        ReportStatus::Queued | ReportStatus::Processing => ("?".normal(), "pending".normal()),
    };
    let strategy = report
        .last_attempt()
        .map(|a| format!(" via {} ({} iteration{})", a.strategy, a.iterations, if a.iterations == 1 { "" } else { "s" }))
        .unwrap_or_default();
    println!(
        "{} {} [{}] {}{}",
        mark,
        report.category.bold(),
        status,
        report.root_cause.as_deref().unwrap_or("unclassified"),
        strategy
    );
    if let Some(err) = report.last_attempt().and_then(|a| a.error.as_deref()) {
        println!("    {}", err.dimmed());
    }
}

fn suggest(config: Config, report: &ErrorReport, format: OutputFormat) -> Result<()> {
    let engine = RemediationEngine::builder(config).dry_run(true).build()?;
    let (cause, suggestion) = engine.diagnose(report);

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({ "root_cause": cause, "suggestion": suggestion });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("{} {}", "Root cause:".bold(), cause.label);
            match suggestion {
                Some(s) => {
                    println!("{} {} ({:.2})", "Strategy:".bold(), s.strategy.cyan(), s.confidence);
                    println!("{} {}", "Fix:".bold(), s.description);
                    for edit in &s.code_edits {
                        println!("  edit {}:{}-{}", edit.file, edit.start_line, edit.end_line);
                    }
                    for command in &s.commands {
                        println!("  $ {}", command);
                    }
                    if let Some(rollback) = &s.rollback {
                        println!("{} {}", "Rollback:".dimmed(), rollback.join(" && ").dimmed());
                    }
                }
                None => println!("{}", "No fix available".yellow()),
            }
        }
    }
    Ok(())
}

fn print_health(snapshot: &SystemHealthSnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(snapshot)?),
        OutputFormat::Text => {
            println!("{} {}", "Sampled:".bold(), snapshot.timestamp.to_rfc3339());
            println!("  cpu     {:>5.1}%", snapshot.cpu_usage);
            println!("  memory  {:>5.1}%", snapshot.memory_usage);
            println!("  disk    {:>5.1}%", snapshot.disk_usage);
            println!(
                "  errors  {} active, {} fixed, {} failed",
                snapshot.active_errors, snapshot.fixed_errors, snapshot.failed_errors
            );
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(_) => {
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
