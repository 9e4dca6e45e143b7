//! Retry policy: decides backoff delays for transient step failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff for transient failures.
///
/// Rate-limit waits do not go through this policy; the upstream already told
/// us how long to wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// delay = base_delay * multiplier^(attempts - 1), capped at `max_delay`.
    ///
    /// `attempts` is the number of failed attempts so far (1-indexed);
    /// 0 is treated like 1.
    ///
    /// With base_delay=2s, multiplier=2.0: 2s, 4s, 8s, 16s, 32s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }
}
