//! Per-provider circuit breaker to prevent retry storms
//!
//! Stops sending to a provider after repeated failures and probes recovery
//! after a cooldown.
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐  failure threshold reached   ┌──────┐
//! │ Closed  │ ──────────────────────────>  │ Open │
//! └─────────┘                              └──────┘
//!     ^                                       │
//!     │ probe succeeds                        │ cooldown elapses
//!     │                                       v
//!     │                          ┌───────────────┐
//!     └──────────────────────────│   Half-Open   │
//!                                └───────────────┘
//!                                        │ probe fails
//!                                        v
//!                                    ┌──────┐
//!                                    │ Open │
//!                                    └──────┘
//! ```
//!
//! Half-open permits exactly one in-flight trial attempt. The probe's outcome
//! decides the next state; while it is pending all other acquisitions are
//! rejected. A probe abandoned without an outcome (e.g. the caller's deadline
//! fired) becomes reclaimable after another cooldown.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failed messages required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time window for counting failures (seconds)
    ///
    /// Failures older than this no longer count toward the threshold.
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,

    /// How long the circuit stays open before a recovery probe (seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_failure_window_secs() -> u64 {
    60
}

const fn default_cooldown_secs() -> u64 {
    300
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, all dispatches allowed
    Closed,
    /// Circuit tripped, reject all dispatches immediately
    Open,
    /// Testing recovery with a single trial attempt
    HalfOpen,
}

/// Per-provider circuit state
#[derive(Debug)]
struct CircuitData {
    state: CircuitState,
    /// Failures within the current window
    failure_count: u32,
    /// Timestamp of the first failure in the current window
    first_failure_at: Option<Instant>,
    /// Timestamp when the circuit was opened
    opened_at: Option<Instant>,
    /// Timestamp of the currently in-flight half-open probe
    probe_started_at: Option<Instant>,
}

impl CircuitData {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            first_failure_at: None,
            opened_at: None,
            probe_started_at: None,
        }
    }

    fn is_failure_window_expired(&self, window: Duration) -> bool {
        self.first_failure_at
            .is_none_or(|first| first.elapsed() > window)
    }

    fn is_cooldown_expired(&self, cooldown: Duration) -> bool {
        self.opened_at
            .is_some_and(|opened| opened.elapsed() >= cooldown)
    }

    /// Record a failed message, returning `true` if the circuit opened
    fn record_failure(&mut self, provider: &str, config: &CircuitBreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed => {
                if self.is_failure_window_expired(Duration::from_secs(config.failure_window_secs))
                {
                    self.failure_count = 0;
                    self.first_failure_at = None;
                }

                if self.first_failure_at.is_none() {
                    self.first_failure_at = Some(Instant::now());
                }
                self.failure_count += 1;

                if self.failure_count >= config.failure_threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                    tracing::warn!(
                        provider = %provider,
                        failure_count = self.failure_count,
                        threshold = config.failure_threshold,
                        cooldown_secs = config.cooldown_secs,
                        "Circuit breaker OPENED - rejecting dispatches to this provider"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // The trial attempt failed, reopen and restart the cooldown
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
                self.probe_started_at = None;
                tracing::warn!(
                    provider = %provider,
                    "Circuit breaker probe failed - reopening circuit"
                );
                true
            }
            CircuitState::Open => false,
        }
    }

    /// Record a successful delivery, returning `true` if the circuit closed
    fn record_success(&mut self, provider: &str) -> bool {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.first_failure_at = None;
                false
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.failure_count = 0;
                self.first_failure_at = None;
                self.opened_at = None;
                self.probe_started_at = None;
                tracing::info!(
                    provider = %provider,
                    "Circuit breaker CLOSED - normal operation resumed"
                );
                true
            }
            CircuitState::Open => {
                tracing::warn!(
                    provider = %provider,
                    "Unexpected success while circuit is open"
                );
                false
            }
        }
    }

    /// Check whether a dispatch may proceed
    fn should_allow(&mut self, config: &CircuitBreakerConfig) -> bool {
        let cooldown = Duration::from_secs(config.cooldown_secs);
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.is_cooldown_expired(cooldown) {
                    self.state = CircuitState::HalfOpen;
                    self.probe_started_at = Some(Instant::now());
                    tracing::info!("Circuit breaker entering HALF-OPEN state - testing recovery");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // One probe at a time; reclaim a probe whose caller vanished
                match self.probe_started_at {
                    Some(started) if started.elapsed() < cooldown => false,
                    _ => {
                        self.probe_started_at = Some(Instant::now());
                        true
                    }
                }
            }
        }
    }
}

/// Per-provider circuit breaker manager
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: DashMap<Arc<str>, Arc<parking_lot::Mutex<CircuitData>>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker manager
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    fn breaker_for(&self, provider: &str) -> Arc<parking_lot::Mutex<CircuitData>> {
        if let Some(breaker) = self.breakers.get(provider) {
            return breaker.clone();
        }
        self.breakers
            .entry(Arc::from(provider))
            .or_insert_with(|| Arc::new(parking_lot::Mutex::new(CircuitData::new())))
            .clone()
    }

    /// Check whether a dispatch to this provider may proceed
    ///
    /// A `true` return while the circuit is half-open claims the single
    /// recovery probe; the caller must follow up with [`record_success`] or
    /// [`record_failure`].
    ///
    /// [`record_success`]: Self::record_success
    /// [`record_failure`]: Self::record_failure
    pub fn should_allow(&self, provider: &str) -> bool {
        self.breaker_for(provider).lock().should_allow(&self.config)
    }

    /// Record a successful delivery
    ///
    /// Returns `true` if the circuit transitioned to Closed (recovered).
    pub fn record_success(&self, provider: &str) -> bool {
        self.breaker_for(provider).lock().record_success(provider)
    }

    /// Record a failed message
    ///
    /// Returns `true` if the circuit transitioned to Open (tripped).
    pub fn record_failure(&self, provider: &str) -> bool {
        self.breaker_for(provider)
            .lock()
            .record_failure(provider, &self.config)
    }

    /// Get the current circuit state for a provider
    pub fn state(&self, provider: &str) -> CircuitState {
        self.breaker_for(provider).lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, cooldown_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            failure_window_secs: 60,
            cooldown_secs,
        }
    }

    #[test]
    fn test_closed_to_open() {
        let breaker = CircuitBreaker::new(config(3, 5));

        assert_eq!(breaker.state("smtp-a"), CircuitState::Closed);
        assert!(breaker.should_allow("smtp-a"));

        breaker.record_failure("smtp-a");
        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Closed);

        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Open);
        assert!(!breaker.should_allow("smtp-a"));
    }

    #[test]
    fn test_half_open_success_closes() {
        let breaker = CircuitBreaker::new(config(2, 0));

        breaker.record_failure("smtp-a");
        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Open);

        // Cooldown of zero: the next check grants the probe
        assert!(breaker.should_allow("smtp-a"));
        assert_eq!(breaker.state("smtp-a"), CircuitState::HalfOpen);

        breaker.record_success("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(2, 0));

        breaker.record_failure("smtp-a");
        breaker.record_failure("smtp-a");
        assert!(breaker.should_allow("smtp-a"));
        assert_eq!(breaker.state("smtp-a"), CircuitState::HalfOpen);

        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Open);
    }

    #[test]
    fn test_half_open_permits_single_probe() {
        let breaker = CircuitBreaker::new(config(1, 1));

        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Open);

        // Force the cooldown to elapse
        {
            let data = breaker.breaker_for("smtp-a");
            data.lock().opened_at = Instant::now().checked_sub(Duration::from_secs(2));
        }

        // First check claims the probe, the second is rejected
        assert!(breaker.should_allow("smtp-a"));
        assert!(!breaker.should_allow("smtp-a"));
        assert_eq!(breaker.state("smtp-a"), CircuitState::HalfOpen);
    }

    #[test]
    fn test_abandoned_probe_is_reclaimed() {
        let breaker = CircuitBreaker::new(config(1, 1));

        breaker.record_failure("smtp-a");
        {
            let data = breaker.breaker_for("smtp-a");
            data.lock().opened_at = Instant::now().checked_sub(Duration::from_secs(2));
        }
        assert!(breaker.should_allow("smtp-a"));

        // The probe's caller never reported an outcome; after a further
        // cooldown the probe becomes available again
        {
            let data = breaker.breaker_for("smtp-a");
            data.lock().probe_started_at = Instant::now().checked_sub(Duration::from_secs(2));
        }
        assert!(breaker.should_allow("smtp-a"));
    }

    #[test]
    fn test_failure_window_expiry() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            failure_window_secs: 1,
            cooldown_secs: 5,
        });

        breaker.record_failure("smtp-a");
        breaker.record_failure("smtp-a");

        // Age the window out
        {
            let data = breaker.breaker_for("smtp-a");
            data.lock().first_failure_at = Instant::now().checked_sub(Duration::from_secs(2));
        }

        // Starts a fresh window: two more failures do not trip
        breaker.record_failure("smtp-a");
        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Closed);

        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(config(3, 5));

        breaker.record_failure("smtp-a");
        breaker.record_failure("smtp-a");
        breaker.record_success("smtp-a");

        breaker.record_failure("smtp-a");
        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Closed);
    }

    #[test]
    fn test_providers_are_independent() {
        let breaker = CircuitBreaker::new(config(1, 60));

        breaker.record_failure("smtp-a");
        assert_eq!(breaker.state("smtp-a"), CircuitState::Open);
        assert_eq!(breaker.state("smtp-b"), CircuitState::Closed);
        assert!(breaker.should_allow("smtp-b"));
    }
}
