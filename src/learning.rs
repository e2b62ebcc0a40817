//! Learning Store
//!
//! Per-category record of which strategies fixed (or failed to fix) an error,
//! used to bias future confidence scores and as a classification fallback.
//!
//! The store is written only by the queue consumer's completion step, so a
//! single `RwLock` is enough inside one engine. A deployment running several
//! engines against one learning file must put a real lock or compare-and-swap
//! in front of the backend.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::LearningError;

/// Rolling statistics for one error category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub category: String,
    pub successful_strategies: Vec<String>,
    pub failed_strategies: Vec<String>,
    pub average_duration_ms: f64,
    pub success_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl LearningRecord {
    fn new(category: &str, now: DateTime<Utc>) -> Self {
        Self {
            category: category.to_string(),
            successful_strategies: Vec::new(),
            failed_strategies: Vec::new(),
            average_duration_ms: 0.0,
            success_rate: 0.0,
            last_updated: now,
        }
    }

    pub fn successes(&self) -> usize {
        self.successful_strategies.len()
    }

    pub fn failures(&self) -> usize {
        self.failed_strategies.len()
    }

    pub fn total_attempts(&self) -> usize {
        self.successes() + self.failures()
    }

    /// Strategy that most recently fixed this category
    pub fn last_successful_strategy(&self) -> Option<&str> {
        self.successful_strategies.last().map(String::as_str)
    }

    fn fold(&mut self, strategy: &str, success: bool, duration_ms: f64, now: DateTime<Utc>) {
        let first_sample = self.total_attempts() == 0;

        if success {
            self.successful_strategies.push(strategy.to_string());
        } else {
            self.failed_strategies.push(strategy.to_string());
        }

        // Always derived from the lists, never set independently
        self.success_rate = self.successes() as f64 / self.total_attempts() as f64;

        self.average_duration_ms = if first_sample {
            duration_ms
        } else {
            (self.average_duration_ms + duration_ms) / 2.0
        };
        self.last_updated = now;
    }
}

/// Replaceable persistence boundary for the learning aggregate
pub trait LearningBackend: Send + Sync {
    fn load(&self) -> Result<HashMap<String, LearningRecord>, LearningError>;
    fn save(&self, records: &HashMap<String, LearningRecord>) -> Result<(), LearningError>;
}

/// Stores the aggregate as a pretty-printed JSON document, replaced atomically
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LearningBackend for JsonFileBackend {
    fn load(&self) -> Result<HashMap<String, LearningRecord>, LearningError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(LearningError::Load {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };
        serde_json::from_str(&content).map_err(|e| LearningError::Corrupted(e.to_string()))
    }

    fn save(&self, records: &HashMap<String, LearningRecord>) -> Result<(), LearningError> {
        let save_err = |message: String| LearningError::Save {
            path: self.path.clone(),
            message,
        };

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| save_err(e.to_string()))?;

        let json = serde_json::to_string_pretty(records).map_err(|e| save_err(e.to_string()))?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&parent).map_err(|e| save_err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| save_err(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| save_err(e.error.to_string()))?;
        Ok(())
    }
}

/// Store statistics
#[derive(Debug, Default)]
pub struct LearningStats {
    pub outcomes_recorded: AtomicU64,
    pub persist_failures: AtomicU64,
}

/// Keyed record of strategy outcomes per error category
pub struct LearningStore {
    records: RwLock<HashMap<String, LearningRecord>>,
    backend: Option<Arc<dyn LearningBackend>>,
    clock: Arc<dyn Clock>,
    stats: LearningStats,
}

impl LearningStore {
    /// In-memory store
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            backend: None,
            clock,
            stats: LearningStats::default(),
        }
    }

    /// Store seeded from, and persisted to, a backend
    pub fn with_backend(
        backend: Arc<dyn LearningBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LearningError> {
        let records = backend.load()?;
        debug!(categories = records.len(), "Loaded learning records");
        Ok(Self {
            records: RwLock::new(records),
            backend: Some(backend),
            clock,
            stats: LearningStats::default(),
        })
    }

    /// Fold one finished fix attempt into the category's aggregate.
    ///
    /// Only the in-memory record changes; [`LearningStore::flush`] writes it
    /// to the backend.
    pub fn record_outcome(&self, category: &str, strategy: &str, success: bool, duration: Duration) {
        let now = self.clock.now();
        let duration_ms = duration.as_secs_f64() * 1000.0;

        {
            let mut records = self.records.write();
            records
                .entry(category.to_string())
                .or_insert_with(|| LearningRecord::new(category, now))
                .fold(strategy, success, duration_ms, now);
        }
        self.stats.outcomes_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Save the aggregate to the backend on the blocking pool.
    ///
    /// Best-effort: a failure is logged and counted, and the in-memory
    /// records are kept either way.
    pub async fn flush(&self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let snapshot = self.records.read().clone();
        let error = match tokio::task::spawn_blocking(move || backend.save(&snapshot)).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(join_err) => join_err.to_string(),
        };
        self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
        warn!(error = %error, "Learning update not persisted");
    }

    pub fn lookup(&self, category: &str) -> Option<LearningRecord> {
        self.records.read().get(category).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, LearningRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn outcomes_recorded(&self) -> u64 {
        self.stats.outcomes_recorded.load(Ordering::Relaxed)
    }

    pub fn persist_failures(&self) -> u64 {
        self.stats.persist_failures.load(Ordering::Relaxed)
    }
}

impl Default for LearningStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
