//! Health Sampler
//!
//! Periodically combines host utilization with the processor's counters into
//! a [`SystemHealthSnapshot`]. The sampler runs as its own tokio task and is
//! unaffected by queue activity.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::HealthConfig;
use crate::errors::RemedyError;
use crate::events::{EventBus, RemediationEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Percent, 0-100
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub disk_usage: f32,
    pub active_errors: u64,
    pub fixed_errors: u64,
    pub failed_errors: u64,
    pub average_fix_time_ms: f64,
}

/// Host utilization in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub cpu: f32,
    pub memory: f32,
    pub disk: f32,
}

pub trait SystemProbe: Send + Sync {
    fn sample(&self, disk_mount: &Path) -> ResourceUsage;
}

fn percent(used: f64, total: f64) -> f32 {
    if total <= 0.0 {
        0.0
    } else {
        ((used / total) * 100.0).clamp(0.0, 100.0) as f32
    }
}

/// Probe backed by `sysinfo`; keeps one `System` so CPU usage is a delta
pub struct SysinfoProbe {
    system: Mutex<sysinfo::System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn sample(&self, disk_mount: &Path) -> ResourceUsage {
        let (cpu, memory) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            (
                system.global_cpu_usage().clamp(0.0, 100.0),
                percent(system.used_memory() as f64, system.total_memory() as f64),
            )
        };

        let disks = sysinfo::Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|d| disk_mount.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| {
                let total = d.total_space() as f64;
                percent(total - d.available_space() as f64, total)
            })
            .unwrap_or(0.0);

        ResourceUsage { cpu, memory, disk }
    }
}

/// Processing counters written by the consumer and read by the sampler
#[derive(Debug, Default)]
pub struct RemediationCounters {
    active: AtomicU64,
    fixed: AtomicU64,
    failed: AtomicU64,
    total_fix_ms: AtomicU64,
    timed_fixes: AtomicU64,
}

impl RemediationCounters {
    pub fn report_queued(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// A queued report left without being processed
    pub fn report_cancelled(&self) {
        self.release_active();
    }

    /// A processed report ended; `duration_ms` is set when an attempt ran
    pub fn report_finished(&self, fixed: bool, duration_ms: Option<u64>) {
        self.release_active();
        if fixed {
            self.fixed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(ms) = duration_ms {
            self.total_fix_ms.fetch_add(ms, Ordering::SeqCst);
            self.timed_fixes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn release_active(&self) {
        // Never wraps below zero
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn fixed(&self) -> u64 {
        self.fixed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn average_fix_time_ms(&self) -> f64 {
        let n = self.timed_fixes.load(Ordering::SeqCst);
        if n == 0 {
            0.0
        } else {
            self.total_fix_ms.load(Ordering::SeqCst) as f64 / n as f64
        }
    }
}

/// Smallest timestamp after `previous` that is not before `now`
pub fn next_timestamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
        _ => now,
    }
}

struct SamplerInner {
    disk_mount: PathBuf,
    probe: Arc<dyn SystemProbe>,
    counters: Arc<RemediationCounters>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    latest: RwLock<Option<SystemHealthSnapshot>>,
}

impl SamplerInner {
    fn tick(&self) -> SystemHealthSnapshot {
        self.record(self.probe.sample(&self.disk_mount))
    }

    /// Probe on the blocking pool; `sysinfo` reads procfs and enumerates disks
    async fn tick_blocking(&self) -> Option<SystemHealthSnapshot> {
        let probe = Arc::clone(&self.probe);
        let mount = self.disk_mount.clone();
        match tokio::task::spawn_blocking(move || probe.sample(&mount)).await {
            Ok(usage) => Some(self.record(usage)),
            Err(e) => {
                warn!(error = %e, "Health probe failed, skipping tick");
                None
            }
        }
    }

    fn record(&self, usage: ResourceUsage) -> SystemHealthSnapshot {
        let mut latest = self.latest.write();
        let timestamp = next_timestamp(latest.as_ref().map(|s| s.timestamp), self.clock.now());
        let snapshot = SystemHealthSnapshot {
            timestamp,
            cpu_usage: usage.cpu,
            memory_usage: usage.memory,
            disk_usage: usage.disk,
            active_errors: self.counters.active(),
            fixed_errors: self.counters.fixed(),
            failed_errors: self.counters.failed(),
            average_fix_time_ms: self.counters.average_fix_time_ms(),
        };
        *latest = Some(snapshot.clone());
        drop(latest);

        self.events.publish(RemediationEvent::HealthUpdate {
            snapshot: snapshot.clone(),
        });
        snapshot
    }
}

pub struct HealthSampler {
    interval: std::time::Duration,
    inner: Arc<SamplerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthSampler {
    pub fn new(
        config: &HealthConfig,
        probe: Arc<dyn SystemProbe>,
        counters: Arc<RemediationCounters>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            interval: config.interval(),
            inner: Arc::new(SamplerInner {
                disk_mount: config.disk_mount.clone(),
                probe,
                counters,
                clock,
                events,
                latest: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Override the tick period
    pub fn with_interval(mut self, interval: std::time::Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Take one sample immediately, outside the periodic task
    pub fn sample_now(&self) -> SystemHealthSnapshot {
        self.inner.tick()
    }

    /// Latest snapshot, if any tick has run
    pub fn snapshot(&self) -> Option<SystemHealthSnapshot> {
        self.inner.latest.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the periodic task; a second call while running is a no-op
    pub fn start(&self) -> Result<(), RemedyError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RemedyError::Runtime(format!("health sampler needs a tokio runtime: {e}")))?;

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let period = self.interval;
        *task = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Some(snapshot) = inner.tick_blocking().await {
                    debug!(
                        cpu = snapshot.cpu_usage,
                        active = snapshot.active_errors,
                        "Health sampled"
                    );
                }
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "Health sampler started");
        Ok(())
    }

    /// Abort the periodic task and wait for it; no tick fires afterwards
    pub async fn stop(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!("Health sampler stopped");
        }
    }
}

impl Drop for HealthSampler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
