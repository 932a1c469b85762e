//! Retry backoff - how long to wait before re-invoking a failed node
//!
//! *How many* retries a node gets comes from the engine's retry budget
//! ([`EngineConfig::retries_for`](crate::config::EngineConfig::retries_for)).
//! This module only decides the *spacing* between them.
//!
//! ```text
//! delay = initial_interval × backoff_factor ^ retry
//! delay = min(delay, max_interval)
//! if jitter: delay *= random(0.5..=1.5)
//! ```
//!
//! With the defaults (0.5s, ×2.0, 128s cap) the first three retries wait
//! roughly 0.5s, 1s, and 2s.
//!
//! # Examples
//!
//! ```rust
//! use taskgraph_core::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::default()
//!     .with_initial_interval(1.0)
//!     .with_max_interval(10.0)
//!     .with_jitter(false);
//!
//! assert_eq!(policy.calculate_delay(0).as_secs_f64(), 1.0);
//! assert_eq!(policy.calculate_delay(5).as_secs_f64(), 10.0);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff between retries of a failed node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry, in seconds
    pub initial_interval: f64,

    /// Multiplier applied after each retry
    pub backoff_factor: f64,

    /// Upper bound on any single delay, in seconds
    pub max_interval: f64,

    /// Randomize each delay by a factor in `0.5..=1.5`
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy that retries without waiting
    pub fn immediate() -> Self {
        Self {
            initial_interval: 0.0,
            backoff_factor: 1.0,
            max_interval: 0.0,
            jitter: false,
        }
    }

    /// Set the delay before the first retry
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum delay
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-indexed)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base_delay = self.initial_interval * self.backoff_factor.powi(exponent);
        let capped_delay = base_delay.min(self.max_interval);

        let final_delay = if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        // NaN or negative intervals collapse to zero, oversized ones saturate
        if final_delay.is_finite() && final_delay > 0.0 {
            Duration::try_from_secs_f64(final_delay).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    /// Check that every interval is usable
    pub fn is_valid(&self) -> bool {
        self.initial_interval.is_finite()
            && self.initial_interval >= 0.0
            && self.backoff_factor.is_finite()
            && self.backoff_factor >= 1.0
            && self.max_interval.is_finite()
            && self.max_interval >= 0.0
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }
}
