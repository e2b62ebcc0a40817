//! Health sampler lifecycle through the engine

use crate::helpers::{test_config, MockRunner, RecordingSink};
use remedy::events::RemediationEvent;
use remedy::executor::DryRunCodeEditor;
use remedy::health::{ResourceUsage, SystemProbe};
use remedy::RemediationEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct StaticProbe;

impl SystemProbe for StaticProbe {
    fn sample(&self, _disk_mount: &Path) -> ResourceUsage {
        ResourceUsage {
            cpu: 5.0,
            memory: 25.0,
            disk: 50.0,
        }
    }
}

fn health_updates(sink: &RecordingSink) -> Vec<chrono::DateTime<chrono::Utc>> {
    sink.events()
        .into_iter()
        .filter_map(|e| match e {
            RemediationEvent::HealthUpdate { snapshot } => Some(snapshot.timestamp),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_ticks_increase_and_stop() {
    let mut config = test_config();
    config.health.enabled = true;
    let sink = Arc::new(RecordingSink::default());
    let engine = RemediationEngine::builder(config)
        .command_runner(Arc::new(MockRunner::succeeding()))
        .code_editor(Arc::new(DryRunCodeEditor))
        .system_probe(Arc::new(StaticProbe))
        .sink(sink.clone())
        .health_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(110)).await;
    engine.shutdown().await;

    let stamps = health_updates(&sink);
    assert!(stamps.len() >= 2, "expected several ticks, got {}", stamps.len());
    assert!(stamps.windows(2).all(|w| w[1] > w[0]));

    let after_stop = stamps.len();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(health_updates(&sink).len(), after_stop);

    let snapshot = engine.get_health();
    assert_eq!(snapshot.cpu_usage, 5.0);
    assert_eq!(snapshot.disk_usage, 50.0);
}

#[tokio::test]
async fn test_disabled_sampler_does_not_tick() {
    let sink = Arc::new(RecordingSink::default());
    let engine = RemediationEngine::builder(test_config())
        .dry_run(true)
        .system_probe(Arc::new(StaticProbe))
        .sink(sink.clone())
        .health_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(health_updates(&sink).is_empty());

    // on-demand sampling still works
    assert_eq!(engine.get_health().memory_usage, 25.0);
}
