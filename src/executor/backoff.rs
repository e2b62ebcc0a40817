//! Delay between failed fix iterations

use std::time::Duration;

use crate::config::{BackoffKind, ExecutorConfig};

/// Backoff policy applied between failed iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * i`
    Linear { base: Duration },
    /// `base * 2^(i-1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        let base = Duration::from_millis(config.base_delay_ms);
        match config.backoff {
            BackoffKind::Linear => Backoff::Linear { base },
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(config.max_delay_ms),
            },
        }
    }

    /// Delay after failed iteration `iteration` (1-based); zero for iteration 0
    pub fn delay(&self, iteration: u32) -> Duration {
        if iteration == 0 {
            return Duration::ZERO;
        }

        match *self {
            Backoff::Linear { base } => base.saturating_mul(iteration),
            Backoff::Exponential { base, max } => {
                let factor = 2u32.checked_pow(iteration - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            base: Duration::from_secs(1),
        }
    }
}
