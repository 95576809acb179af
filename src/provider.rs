//! Delivery provider capability boundary

use async_trait::async_trait;
use thiserror::Error;

use crate::message::Message;

/// An opaque delivery backend
///
/// A provider exposes a single "attempt delivery" capability that succeeds or
/// fails. Providers are stateless across calls from the dispatcher's
/// perspective; per-provider health is tracked by the circuit breaker, not by
/// the provider itself. Timeouts on the delivery call are the provider's
/// responsibility.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier for this provider, used for circuit breaking and
    /// status records
    fn name(&self) -> &str;

    /// Attempt to deliver a message
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] describing whether the failure is worth
    /// retrying.
    async fn attempt_delivery(&self, message: &Message) -> Result<(), ProviderError>;
}

/// Failure reported by a provider's delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Transient failure, retried with backoff (e.g. connection refused,
    /// provider temporarily overloaded)
    #[error("transient failure: {0}")]
    Transient(String),

    /// Permanent failure, never retried (e.g. recipient rejected)
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Returns `true` if this failure may succeed on retry
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` if retrying is pointless
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}
