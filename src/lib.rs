//! Reliability layer for dispatching discrete messages through one of several
//! interchangeable delivery providers
//!
//! This crate provides functionality to:
//! - Retry transient delivery failures with exponential backoff
//! - Fail over between providers and skip unhealthy ones (circuit breaking)
//! - Suppress duplicate submissions via content fingerprinting
//! - Bound throughput with a fixed-window rate limiter
//! - Track every dispatch outcome in an append-only status ledger

mod circuit_breaker;
mod dedup;
mod dispatcher;
mod error;
mod events;
mod ledger;
mod message;
mod provider;
mod rate_limiter;
mod retry;
mod rotator;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use dedup::{DedupConfig, IdempotencyCache};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherConfig};
pub use error::{ConfigError, DispatchError};
pub use events::{DispatchEvent, EventSink, TracingSink};
pub use ledger::{DispatchStatus, StatusLedger, StatusRecord};
pub use message::{Fingerprint, Message};
pub use provider::{Provider, ProviderError};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;
pub use rotator::ProviderRotator;
