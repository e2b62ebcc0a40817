//! Classification and strategy selection across error families
//!
//! Each case runs a report through the classifier and the dispatcher the way
//! the processor does, without executing anything.

use remedy::classifier::{CauseSource, RootCauseClassifier, UNKNOWN_ROOT_CAUSE};
use remedy::config::{BlendMode, StrategyConfig};
use remedy::learning::LearningStore;
use remedy::report::{ErrorReport, Severity};
use remedy::strategy::{Strategy, StrategyDispatcher};
use std::sync::Arc;
use std::time::Duration;

struct Pipeline {
    classifier: RootCauseClassifier,
    dispatcher: StrategyDispatcher,
    learning: Arc<LearningStore>,
}

impl Pipeline {
    fn new(config: StrategyConfig) -> Self {
        let learning = Arc::new(LearningStore::default());
        Self {
            classifier: RootCauseClassifier::new(learning.clone()),
            dispatcher: StrategyDispatcher::new(config, learning.clone()),
            learning,
        }
    }

    fn run(&self, category: &str, message: &str) -> (String, Option<(String, f32)>) {
        let report = ErrorReport::new(category, message, Severity::Medium);
        let cause = self.classifier.classify(&report);
        let suggestion = self
            .dispatcher
            .suggest(&report, &cause)
            .map(|s| (s.strategy, s.confidence));
        (cause.label, suggestion)
    }
}

#[test]
fn test_families_map_to_strategies() {
    let p = Pipeline::new(StrategyConfig::default());
    let cases = [
        ("DependencyError", "Cannot find module 'express'", "dependency_resolution"),
        ("SyntaxError", "Unexpected token '}'", "syntax_correction"),
        ("NetworkError", "connect ETIMEDOUT 10.0.0.1:443", "network_repair"),
        ("PermissionError", "EACCES: permission denied", "permission_repair"),
        ("BuildError", "Build failed with 3 errors", "deployment_repair"),
        ("MemoryError", "JavaScript heap out of memory", "resource_cleanup"),
        ("TypeError", "x is not a function", "generic"),
    ];
    for (category, message, expected) in cases {
        let (_, suggestion) = p.run(category, message);
        let (strategy, _) = suggestion.unwrap_or_else(|| panic!("no suggestion for {category}"));
        assert_eq!(strategy, expected, "{category}");
    }
}

#[test]
fn test_dependency_scenario() {
    let p = Pipeline::new(StrategyConfig::default());
    let (label, suggestion) = p.run("DependencyError", "Cannot find module 'x'");
    assert!(label.to_lowercase().contains("missing dependency"));
    let (strategy, confidence) = suggestion.unwrap();
    assert_eq!(strategy, "dependency_resolution");
    assert!(confidence >= 0.5);
}

#[test]
fn test_unknown_category_lowest_tier() {
    let p = Pipeline::new(StrategyConfig::default());
    let (label, suggestion) = p.run("FooBarError", "the widget sneezed");
    assert_eq!(label, UNKNOWN_ROOT_CAUSE);
    let (strategy, confidence) = suggestion.unwrap();
    assert_eq!(strategy, "generic");
    for s in Strategy::ALL {
        assert!(confidence <= s.prior());
    }
}

#[test]
fn test_learned_history_shapes_both_stages() {
    let p = Pipeline::new(StrategyConfig {
        blend: BlendMode::Average,
        ..StrategyConfig::default()
    });
    for _ in 0..4 {
        p.learning
            .record_outcome("FooBarError", "generic", true, Duration::from_millis(50));
    }

    let report = ErrorReport::new("FooBarError", "the widget sneezed", Severity::Medium);
    let cause = p.classifier.classify(&report);
    assert_eq!(
        cause.source,
        CauseSource::Learned {
            strategy: "generic".into()
        }
    );

    // rate 1.0 > 0.7, so (0.3 + 1.0) / 2
    let suggestion = p.dispatcher.suggest(&report, &cause).unwrap();
    assert!((suggestion.confidence - 0.65).abs() < 1e-5);
}

#[test]
fn test_confidence_always_in_unit_range() {
    let p = Pipeline::new(StrategyConfig {
        confidence_threshold: 0.0,
        ..StrategyConfig::default()
    });
    for success in [true, false, true] {
        p.learning
            .record_outcome("NetworkError", "network_repair", success, Duration::ZERO);
    }
    let (_, suggestion) = p.run("NetworkError", "ECONNRESET");
    let (_, confidence) = suggestion.unwrap();
    assert!((0.0..=1.0).contains(&confidence));
}
