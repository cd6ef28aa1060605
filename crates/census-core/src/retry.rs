// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Conflict backoff for optimistic write loops.
//!
//! Optimistic writers retry without an attempt limit: each retry re-reads
//! fresh state, so progress is guaranteed by the data, not by a counter. The
//! backoff only spreads contending writers apart.
//!
//! # Example
//!
//! ```
//! use census_core::retry::{BackoffConfig, ConflictBackoff};
//! use std::time::Duration;
//!
//! let backoff = ConflictBackoff::new(BackoffConfig {
//!     initial_delay: Duration::from_millis(5),
//!     max_delay: Duration::from_millis(40),
//!     multiplier: 2.0,
//!     jitter: 0.0,
//! });
//!
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(5));
//! assert_eq!(backoff.delay(3), Duration::from_millis(20));
//! assert_eq!(backoff.delay(10), Duration::from_millis(40));
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// =============================================================================
// BackoffConfig
// =============================================================================

/// Backoff between optimistic write attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound of any single delay.
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Growth factor per retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(5)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl BackoffConfig {
    /// No waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

// =============================================================================
// ConflictBackoff
// =============================================================================

const MAX_EXPONENT: u32 = 32;

/// Computes and applies delays between conflicting write attempts.
#[derive(Debug, Clone, Default)]
pub struct ConflictBackoff {
    config: BackoffConfig,
}

impl ConflictBackoff {
    /// Creates a backoff.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before attempt `attempt` (0-based). The first attempt never waits.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.config.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT) as i32;
        let factor = self.config.multiplier.max(1.0).powi(exponent);
        let base = self.config.initial_delay.as_nanos() as f64 * factor;
        let capped = base.min(self.config.max_delay.as_nanos() as f64);
        apply_jitter(Duration::from_nanos(capped.round() as u64), self.config.jitter)
    }

    /// Sleeps before attempt `attempt`.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }
    let nanos = duration.as_nanos() as f64;
    let offset = rand::thread_rng().gen_range(-1.0..=1.0) * nanos * jitter_factor.min(1.0);
    Duration::from_nanos((nanos + offset).max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_and_caps() {
        let backoff = ConflictBackoff::new(BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
        });
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(10));
        assert_eq!(backoff.delay(2), Duration::from_millis(20));
        assert_eq!(backoff.delay(4), Duration::from_millis(50));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(50));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let backoff = ConflictBackoff::new(BackoffConfig::default().with_jitter(0.5));
        for attempt in 1..20 {
            let delay = backoff.delay(attempt);
            assert!(delay <= Duration::from_millis(750));
        }
    }

    #[test]
    fn test_immediate_never_waits() {
        let backoff = ConflictBackoff::new(BackoffConfig::immediate());
        assert_eq!(backoff.delay(7), Duration::ZERO);
    }

    #[test]
    fn test_config_serde_millis() {
        let config: BackoffConfig =
            serde_json::from_str(r#"{"initial_delay": 1, "max_delay": 100}"#).unwrap();
        assert_eq!(config.initial_delay, Duration::from_millis(1));
        assert_eq!(config.multiplier, 2.0);
    }
}
