//! Retry policy with exponential backoff
//!
//! A single logical delivery is executed as up to `max_attempts` physical
//! attempts. The delay before retry *r* (1-indexed) is
//! `base * 2^(r - 1)`, capped at `max_delay_ms` and optionally jittered to
//! avoid thundering herds.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy configuration for dispatch operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of physical delivery attempts per provider
    ///
    /// `max_attempts = retries + 1`; the first attempt is not a retry.
    ///
    /// Default: 3 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff (milliseconds)
    ///
    /// Default: 1000 ms
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff delay (milliseconds)
    ///
    /// Caps the exponential growth.
    ///
    /// Default: 60000 ms (1 minute)
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter factor for randomizing backoff delays
    ///
    /// The delay is randomized within ±`jitter_factor`. Zero keeps delays
    /// exact.
    ///
    /// Default: 0.0
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Check whether another attempt should be made after `attempts`
    /// completed attempts
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff delay before retry number `retry` (1-indexed)
    ///
    /// `base * 2^(retry - 1)`, saturating and capped at `max_delay_ms`, with
    /// ±`jitter_factor` randomization applied when configured.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let millis = if exponent >= 63 {
            self.max_delay_ms
        } else {
            self.base_delay_ms
                .saturating_mul(1u64 << exponent)
                .min(self.max_delay_ms)
        };

        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(millis);
        }

        // Intentional precision loss for randomization
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let jittered = {
            let jitter_range = (millis as f64) * self.jitter_factor;
            let mut rng = rand::rng();
            let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
            ((millis as f64) + jitter).max(0.0) as u64
        };

        Duration::from_millis(jittered)
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        1000
    }

    pub const fn max_delay_ms() -> u64 {
        60000
    }

    pub const fn jitter_factor() -> f64 {
        0.0
    }
}
