//! Unit tests for the config module
//!
//! Tests cover:
//! - Defaults
//! - TOML loading, including partial files
//! - Validation failures
//! - Serialization back to TOML

use remedy::config::{BackoffKind, BlendMode, Config, RuleConfig};
use std::io::Write;

// ============================================================================
// Defaults
// ============================================================================

mod defaults_tests {
    use super::*;

    #[test]
    fn test_executor_defaults() {
        let config = Config::default();
        assert_eq!(config.executor.max_retries, 5);
        assert_eq!(config.executor.base_delay_ms, 1000);
        assert_eq!(config.executor.backoff, BackoffKind::Linear);
    }

    #[test]
    fn test_strategy_defaults() {
        let config = Config::default();
        assert!((config.strategy.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.strategy.blend, BlendMode::Multiply);
        assert_eq!(config.strategy.package_manager, "npm");
        assert!(config.strategy.disabled.is_empty());
    }

    #[test]
    fn test_health_defaults() {
        let config = Config::default();
        assert!(config.health.enabled);
        assert_eq!(config.health.interval_secs, 30);
    }

    #[test]
    fn test_default_validates() {
        assert!(Config::default().validate().is_ok());
    }
}

// ============================================================================
// Loading
// ============================================================================

mod load_tests {
    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
[executor]
max_retries = 2
backoff = "exponential"
"#,
        );
        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.executor.max_retries, 2);
        assert_eq!(config.executor.backoff, BackoffKind::Exponential);
        assert_eq!(config.executor.base_delay_ms, 1000);
        assert_eq!(config.queue.history_limit, 1000);
    }

    #[test]
    fn test_classifier_rules_from_file() {
        let file = write_config(
            r#"
[[classifier.extra_rules]]
pattern = "(?i)ERR_PNPM_"
label = "pnpm store corruption"
"#,
        );
        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(
            config.classifier.extra_rules,
            vec![RuleConfig {
                pattern: "(?i)ERR_PNPM_".into(),
                label: "pnpm store corruption".into(),
            }]
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Config::load(Some("/definitely/not/here/remedy.toml")).is_err());
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let file = write_config("[strategy]\nconfidence_threshold = 1.5\n");
        let err = Config::load(file.path().to_str()).unwrap_err();
        assert_eq!(remedy::errors::get_exit_code(&err), remedy::errors::EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = Config::default();
        config.strategy.disabled = vec!["generic".into()];
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.strategy.disabled, vec!["generic".to_string()]);
    }
}

// ============================================================================
// Validation
// ============================================================================

mod validation_tests {
    use super::*;

    #[test]
    fn test_zero_retries() {
        let mut config = Config::default();
        config.executor.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_delay_below_base() {
        let mut config = Config::default();
        config.executor.max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_rule_regex() {
        let mut config = Config::default();
        config.classifier.extra_rules.push(RuleConfig {
            pattern: "[unclosed".into(),
            label: "bad".into(),
        });
        assert!(config.validate().is_err());
    }
}
