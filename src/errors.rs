use std::path::PathBuf;
use thiserror::Error;

/// The central error type for the remediation engine.
///
/// Only ingestion, configuration and runtime errors ever reach a caller.
/// Execution errors are captured into the owning `FixAttempt` and learning
/// errors are logged, so the queue consumer never unwinds because one report
/// could not be fixed.
#[derive(Error, Debug)]
pub enum RemedyError {
    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Learning store error: {0}")]
    Learning(#[from] LearningError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Report is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Unknown severity '{0}' (expected low, medium, high or critical)")]
    InvalidSeverity(String),

    #[error("Malformed report: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Command '{command}' exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Command '{command}' timed out after {seconds} seconds")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    #[error("Code edit on {file} failed: {message}")]
    CodeEdit { file: String, message: String },

    #[error("Remediation task panicked: {0}")]
    Panic(String),
}

#[derive(Error, Debug)]
pub enum LearningError {
    #[error("Failed to read learning data at {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Failed to write learning data at {path}: {message}")]
    Save { path: PathBuf, message: String },

    #[error("Learning data corrupted: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, RemedyError>;

/// Check if an anyhow error is a rejected ingestion (bad input, not a crash)
pub fn is_ingest_error(e: &anyhow::Error) -> bool {
    if let Some(RemedyError::Ingest(_)) = e.downcast_ref::<RemedyError>() {
        return true;
    }

    e.downcast_ref::<IngestError>().is_some()
}

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_INGEST_ERROR: u8 = 3;
pub const EXIT_REMEDIATION_FAILED: u8 = 4;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if is_ingest_error(e) {
        return EXIT_INGEST_ERROR;
    }

    if let Some(remedy_err) = e.downcast_ref::<RemedyError>() {
        return match remedy_err {
            RemedyError::Config(_) => EXIT_CONFIG_ERROR,
            RemedyError::Execution(_) => EXIT_REMEDIATION_FAILED,
            _ => EXIT_ERROR,
        };
    }

    if e.downcast_ref::<ExecutionError>().is_some() {
        return EXIT_REMEDIATION_FAILED;
    }

    // Fallback string matching for errors raised through anyhow context only
    let msg = e.to_string().to_lowercase();
    if msg.contains("config") {
        return EXIT_CONFIG_ERROR;
    }

    EXIT_ERROR
}
