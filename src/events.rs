//! Structured dispatch event emission
//!
//! Decouples observability from the status ledger's data retention: the
//! dispatcher emits [`DispatchEvent`]s to an injected [`EventSink`], and the
//! default sink forwards them as structured `tracing` events. Consumers that
//! want metrics or audit trails implement their own sink.

use std::{sync::Arc, time::Duration};

use crate::message::Fingerprint;

/// An observable moment in the life of a dispatch
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A message passed the fast-reject gates and entered the pipeline
    Accepted {
        /// Dedup key of the accepted message
        fingerprint: Fingerprint,
    },
    /// A submission was suppressed as a duplicate
    Duplicate {
        /// Dedup key that was already reserved
        fingerprint: Fingerprint,
    },
    /// A submission was rejected by the rate limiter
    RateLimited {
        /// Time until the current window resets
        retry_after: Duration,
    },
    /// No provider was eligible (all circuits open)
    NoEligibleProvider,
    /// A single delivery attempt failed
    AttemptFailed {
        /// Provider that failed
        provider: Arc<str>,
        /// Physical attempt number, 1-indexed
        attempt: u32,
        /// Failure reason
        error: String,
    },
    /// The active provider was rotated after exhausting its retries
    ProviderRotated {
        /// Provider rotated away from
        from: Arc<str>,
    },
    /// A provider's circuit opened
    CircuitOpened {
        /// Provider whose circuit tripped
        provider: Arc<str>,
    },
    /// A provider's circuit closed again
    CircuitClosed {
        /// Provider that recovered
        provider: Arc<str>,
    },
    /// A message was delivered
    Sent {
        /// Provider that delivered it
        provider: Arc<str>,
        /// Physical attempts used
        attempts: u32,
    },
    /// A message terminally failed
    Failed {
        /// Provider that exhausted its attempts
        provider: Arc<str>,
        /// Physical attempts used
        attempts: u32,
    },
    /// A dispatch was abandoned at the caller's deadline
    Cancelled {
        /// Time spent before cancellation
        elapsed: Duration,
    },
}

/// Sink for dispatch events
///
/// Injected into the dispatcher at construction time. Implementations must
/// be cheap and non-blocking; they are called inline on the dispatch path.
pub trait EventSink: Send + Sync {
    /// Emit one event
    fn emit(&self, event: &DispatchEvent);
}

/// Default sink: forwards events as structured `tracing` output
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Accepted { fingerprint } => {
                tracing::debug!(fingerprint = %fingerprint, "Message accepted for dispatch");
            }
            DispatchEvent::Duplicate { fingerprint } => {
                tracing::info!(fingerprint = %fingerprint, "Duplicate submission suppressed");
            }
            DispatchEvent::RateLimited { retry_after } => {
                tracing::warn!(
                    retry_after_secs = retry_after.as_secs_f64(),
                    "Dispatch rejected by rate limiter"
                );
            }
            DispatchEvent::NoEligibleProvider => {
                tracing::error!("No provider available - all circuits open");
            }
            DispatchEvent::AttemptFailed {
                provider,
                attempt,
                error,
            } => {
                tracing::debug!(
                    provider = %provider,
                    attempt = attempt,
                    error = %error,
                    "Delivery attempt failed"
                );
            }
            DispatchEvent::ProviderRotated { from } => {
                tracing::info!(provider = %from, "Rotating away from provider");
            }
            DispatchEvent::CircuitOpened { provider } => {
                tracing::warn!(provider = %provider, "Provider circuit opened");
            }
            DispatchEvent::CircuitClosed { provider } => {
                tracing::info!(provider = %provider, "Provider circuit closed");
            }
            DispatchEvent::Sent { provider, attempts } => {
                tracing::info!(
                    provider = %provider,
                    attempts = attempts,
                    "Message delivered"
                );
            }
            DispatchEvent::Failed { provider, attempts } => {
                tracing::warn!(
                    provider = %provider,
                    attempts = attempts,
                    "Message failed after exhausting attempts"
                );
            }
            DispatchEvent::Cancelled { elapsed } => {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Dispatch cancelled at caller deadline"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &DispatchEvent) {
            self.seen.lock().unwrap().push(format!("{event:?}"));
        }
    }

    #[test]
    fn test_custom_sink_receives_events() {
        let sink = RecordingSink::default();
        sink.emit(&DispatchEvent::NoEligibleProvider);
        sink.emit(&DispatchEvent::RateLimited {
            retry_after: Duration::from_secs(1),
        });
        assert_eq!(sink.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_tracing_sink_handles_all_variants() {
        let sink = TracingSink;
        let provider: Arc<str> = Arc::from("smtp-a");
        let fingerprint = crate::message::Message::new("a", "b", "c").fingerprint();

        for event in [
            DispatchEvent::Accepted {
                fingerprint: fingerprint.clone(),
            },
            DispatchEvent::Duplicate { fingerprint },
            DispatchEvent::RateLimited {
                retry_after: Duration::from_secs(1),
            },
            DispatchEvent::NoEligibleProvider,
            DispatchEvent::AttemptFailed {
                provider: provider.clone(),
                attempt: 1,
                error: "busy".to_string(),
            },
            DispatchEvent::ProviderRotated {
                from: provider.clone(),
            },
            DispatchEvent::CircuitOpened {
                provider: provider.clone(),
            },
            DispatchEvent::CircuitClosed {
                provider: provider.clone(),
            },
            DispatchEvent::Sent {
                provider: provider.clone(),
                attempts: 1,
            },
            DispatchEvent::Failed {
                provider,
                attempts: 3,
            },
            DispatchEvent::Cancelled {
                elapsed: Duration::from_millis(100),
            },
        ] {
            sink.emit(&event);
        }
    }
}
