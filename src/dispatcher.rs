//! Dispatch orchestration
//!
//! The [`Dispatcher`] is the service object owning every mutable structure in
//! the pipeline: idempotency cache, rate limiter, circuit breaker, provider
//! rotator, status ledger, and event sink. It is constructed once and shared
//! by reference; there are no process-wide singletons.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    dedup::{DedupConfig, IdempotencyCache},
    error::{ConfigError, DispatchError},
    events::{DispatchEvent, EventSink, TracingSink},
    ledger::{DispatchStatus, StatusLedger, StatusRecord},
    message::Message,
    provider::Provider,
    rate_limiter::{RateLimitConfig, RateLimiter},
    retry::RetryPolicy,
    rotator::ProviderRotator,
};

const fn default_batch_concurrency() -> usize {
    1
}

/// Configuration for the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Throughput bound per time window
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry-with-backoff behavior per provider
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Per-provider failure threshold and cooldown
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Idempotency retention window
    #[serde(default)]
    pub dedup: DedupConfig,

    /// How many messages a batch may dispatch concurrently
    ///
    /// `1` (the default) processes batches sequentially, which additionally
    /// guarantees that ledger entries for the batch appear in input order.
    /// Larger values use a bounded worker pool; results are still returned
    /// in input order.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Overall deadline per message (milliseconds)
    ///
    /// When set, a dispatch still in flight at the deadline is abandoned and
    /// reported as cancelled. `None` (the default) applies no deadline.
    #[serde(default)]
    pub message_deadline_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            dedup: DedupConfig::default(),
            batch_concurrency: default_batch_concurrency(),
            message_deadline_ms: None,
        }
    }
}

/// Successful (non-error) outcome of dispatching one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered by the named provider
    Sent {
        /// Provider that delivered the message
        provider: Arc<str>,
    },
    /// Suppressed as a duplicate of an already-accepted message
    Duplicate,
}

/// Orchestrates retries, failover, deduplication, rate limiting, circuit
/// breaking, and status tracking per message and across batches
pub struct Dispatcher {
    retry: RetryPolicy,
    batch_concurrency: usize,
    message_deadline: Option<Duration>,
    cache: IdempotencyCache,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    rotator: ProviderRotator,
    ledger: StatusLedger,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("retry", &self.retry)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("message_deadline", &self.message_deadline)
            .field("rotator", &self.rotator)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with the default `tracing`-backed event sink
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProviders`] if `providers` is empty.
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        config: DispatcherConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_sink(providers, config, Arc::new(TracingSink))
    }

    /// Create a dispatcher with an injected event sink
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProviders`] if `providers` is empty.
    pub fn with_sink(
        providers: Vec<Arc<dyn Provider>>,
        config: DispatcherConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            cache: IdempotencyCache::new(&config.dedup),
            limiter: RateLimiter::new(&config.rate_limit),
            breaker: CircuitBreaker::new(config.circuit_breaker),
            rotator: ProviderRotator::new(providers)?,
            ledger: StatusLedger::new(),
            retry: config.retry,
            batch_concurrency: config.batch_concurrency.max(1),
            message_deadline: config.message_deadline_ms.map(Duration::from_millis),
            sink,
        })
    }

    /// Dispatch a single message
    ///
    /// Every call appends exactly one ledger entry for the message.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::RateLimitExceeded`] if the window's limit is
    ///   exhausted (no provider contacted)
    /// - [`DispatchError::AllProvidersUnavailable`] if every circuit is open
    /// - [`DispatchError::ProviderFailed`] once retries on the active
    ///   provider are exhausted
    /// - [`DispatchError::Cancelled`] if the configured per-message deadline
    ///   fires first
    pub async fn send_one(&self, message: &Message) -> Result<DispatchOutcome, DispatchError> {
        if let Err(retry_after) = self.limiter.try_acquire() {
            self.sink.emit(&DispatchEvent::RateLimited { retry_after });
            self.ledger
                .record(message.clone(), DispatchStatus::Rejected, None);
            return Err(DispatchError::RateLimitExceeded { retry_after });
        }

        let fingerprint = message.fingerprint();
        if !self.cache.try_reserve(&fingerprint) {
            self.sink.emit(&DispatchEvent::Duplicate {
                fingerprint: fingerprint.clone(),
            });
            self.ledger
                .record(message.clone(), DispatchStatus::Duplicate, None);
            return Ok(DispatchOutcome::Duplicate);
        }
        self.sink.emit(&DispatchEvent::Accepted {
            fingerprint: fingerprint.clone(),
        });

        let started = Instant::now();
        let delivered = match self.message_deadline {
            Some(deadline) => match tokio::time::timeout(deadline, self.deliver(message)).await {
                Ok(result) => result,
                Err(_) => {
                    let elapsed = started.elapsed();
                    self.cache.release(&fingerprint);
                    self.sink.emit(&DispatchEvent::Cancelled { elapsed });
                    self.ledger
                        .record(message.clone(), DispatchStatus::Failed, None);
                    return Err(DispatchError::Cancelled { elapsed });
                }
            },
            None => self.deliver(message).await,
        };

        match delivered {
            Ok((provider, attempts)) => {
                self.sink.emit(&DispatchEvent::Sent {
                    provider: provider.clone(),
                    attempts,
                });
                self.ledger.record(
                    message.clone(),
                    DispatchStatus::Sent,
                    Some(provider.clone()),
                );
                Ok(DispatchOutcome::Sent { provider })
            }
            Err(DispatchError::AllProvidersUnavailable) => {
                self.cache.release(&fingerprint);
                self.sink.emit(&DispatchEvent::NoEligibleProvider);
                self.ledger
                    .record(message.clone(), DispatchStatus::Rejected, None);
                Err(DispatchError::AllProvidersUnavailable)
            }
            Err(error) => {
                self.cache.release(&fingerprint);
                if let DispatchError::ProviderFailed {
                    provider, attempts, ..
                } = &error
                {
                    self.sink.emit(&DispatchEvent::Failed {
                        provider: provider.clone(),
                        attempts: *attempts,
                    });
                    self.ledger.record(
                        message.clone(),
                        DispatchStatus::Failed,
                        Some(provider.clone()),
                    );
                } else {
                    self.ledger
                        .record(message.clone(), DispatchStatus::Failed, None);
                }
                Err(error)
            }
        }
    }

    /// Run the retry loop against the currently eligible provider
    ///
    /// Returns the delivering provider's name and the number of physical
    /// attempts used.
    async fn deliver(&self, message: &Message) -> Result<(Arc<str>, u32), DispatchError> {
        let Some(provider) = self.rotator.eligible(&self.breaker) else {
            return Err(DispatchError::AllProvidersUnavailable);
        };
        let name: Arc<str> = Arc::from(provider.name());

        // A half-open circuit grants exactly one trial attempt, so the retry
        // budget collapses to a single attempt for a probe.
        let max_attempts = if self.breaker.state(&name) == CircuitState::HalfOpen {
            1
        } else {
            self.retry.max_attempts.max(1)
        };

        let mut attempt = 1;
        loop {
            match provider.attempt_delivery(message).await {
                Ok(()) => {
                    if self.breaker.record_success(&name) {
                        self.sink.emit(&DispatchEvent::CircuitClosed {
                            provider: name.clone(),
                        });
                    }
                    return Ok((name, attempt));
                }
                Err(error) => {
                    self.sink.emit(&DispatchEvent::AttemptFailed {
                        provider: name.clone(),
                        attempt,
                        error: error.to_string(),
                    });

                    if error.is_transient() && attempt < max_attempts {
                        // Backoff before retry r doubles with each retry
                        tokio::time::sleep(self.retry.backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    // Exhausted: one breaker failure per failed message, then
                    // rotate to the next provider
                    if self.breaker.record_failure(&name) {
                        self.sink.emit(&DispatchEvent::CircuitOpened {
                            provider: name.clone(),
                        });
                    }
                    self.rotator.advance();
                    self.sink.emit(&DispatchEvent::ProviderRotated {
                        from: name.clone(),
                    });

                    return Err(DispatchError::ProviderFailed {
                        provider: name,
                        attempts: attempt,
                        source: error,
                    });
                }
            }
        }
    }

    /// Dispatch a batch of messages, continuing past individual failures
    ///
    /// Outcomes are returned in input order; one failing message never
    /// aborts the rest of the batch. Concurrency follows
    /// [`DispatcherConfig::batch_concurrency`].
    pub async fn send_many(
        &self,
        messages: &[Message],
    ) -> Vec<Result<DispatchOutcome, DispatchError>> {
        if self.batch_concurrency <= 1 {
            let mut outcomes = Vec::with_capacity(messages.len());
            for message in messages {
                outcomes.push(self.send_one(message).await);
            }
            return outcomes;
        }

        stream::iter(messages)
            .map(|message| self.send_one(message))
            .buffered(self.batch_concurrency)
            .collect()
            .await
    }

    /// Point-in-time copy of the status ledger for external reporting
    #[must_use]
    pub fn ledger_snapshot(&self) -> Vec<StatusRecord> {
        self.ledger.snapshot()
    }

    /// The append-only status ledger
    #[must_use]
    pub const fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    /// Drop idempotency reservations older than the retention window
    ///
    /// Returns the number of entries removed. Callers with long-lived
    /// dispatchers should invoke this periodically.
    pub fn purge_expired_fingerprints(&self) -> usize {
        self.cache.purge_expired()
    }
}
