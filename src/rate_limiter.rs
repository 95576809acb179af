//! Fixed-window rate limiting for dispatch throughput
//!
//! Bounds how many messages may enter the delivery pipeline per time window.
//! Rejection is a fast-fail distinct from provider failure: it consumes no
//! retry attempt and is never counted against a provider's circuit breaker.
//!
//! # Fixed Window
//!
//! ```text
//! Limit: 5 per 60s
//! - Acquisitions 1..=5 within a window are granted
//! - Acquisition 6 is rejected with the time remaining until reset
//! - At the window boundary the counter resets atomically
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum acquisitions granted per window
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Window duration (seconds)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
        }
    }
}

const fn default_limit() -> u32 {
    100
}

const fn default_window_secs() -> u64 {
    60
}

/// Counter state for the current window
#[derive(Debug)]
struct RateWindow {
    /// Acquisitions granted in the current window
    count: u32,
    /// When the current window began
    window_start: Instant,
}

/// Fixed-window counting rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: parking_lot::Mutex<RateWindow>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.limit,
            window: Duration::from_secs(config.window_secs),
            state: parking_lot::Mutex::new(RateWindow {
                count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    /// Try to acquire a dispatch slot
    ///
    /// Returns `Ok(())` if granted, `Err(Duration)` with the time until the
    /// window resets if the limit for the current window is exhausted.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();

        let elapsed = state.window_start.elapsed();
        if elapsed >= self.window {
            state.count = 0;
            state.window_start = Instant::now();
        }

        if state.count < self.limit {
            state.count += 1;
            Ok(())
        } else {
            let retry_after = self.window.saturating_sub(state.window_start.elapsed());
            drop(state);
            tracing::debug!(
                retry_after_secs = retry_after.as_secs_f64(),
                "Rate limit exceeded, dispatch rejected"
            );
            Err(retry_after)
        }
    }
}
