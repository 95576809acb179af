//! Typed error handling for dispatch operations
//!
//! Distinguishes the ways a dispatch can fail:
//! - Fast rejections before any provider is contacted (rate limit, all
//!   circuits open)
//! - Provider failure surfaced only after retries are exhausted
//! - Cancellation at a caller-imposed deadline
//!
//! A duplicate submission is deliberately *not* an error; it is a recognized
//! non-delivery outcome ([`crate::DispatchOutcome::Duplicate`]).

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::provider::ProviderError;

/// Top-level dispatch error type
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The rate limiter rejected the submission before any provider was
    /// contacted. The caller may retry after the window resets.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Time until the current window resets
        retry_after: Duration,
    },

    /// Every provider's circuit is open. Fatal for this message; the caller
    /// must back off and resubmit later.
    #[error("no provider available: all circuits open")]
    AllProvidersUnavailable,

    /// Delivery failed after exhausting all attempts on the active provider
    #[error("delivery via {provider} failed after {attempts} attempt(s): {source}")]
    ProviderFailed {
        /// Provider that exhausted its attempts
        provider: Arc<str>,
        /// Physical attempts made
        attempts: u32,
        /// The final attempt's failure
        source: ProviderError,
    },

    /// The operation was abandoned at the caller's deadline; the message was
    /// left unsent and is not retried further
    #[error("dispatch cancelled after {elapsed:?}")]
    Cancelled {
        /// Time spent before cancellation
        elapsed: Duration,
    },
}

impl DispatchError {
    /// Returns `true` if resubmitting the same message later is reasonable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. }
            | Self::AllProvidersUnavailable
            | Self::Cancelled { .. } => true,
            Self::ProviderFailed { source, .. } => source.is_transient(),
        }
    }

    /// Returns `true` if no provider was contacted for this message
    #[must_use]
    pub const fn is_fast_reject(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::AllProvidersUnavailable
        )
    }
}

/// Dispatcher construction error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The provider collection must hold at least one provider
    #[error("at least one provider is required")]
    NoProviders,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_reject_classification() {
        let error = DispatchError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        };
        assert!(error.is_fast_reject());
        assert!(error.is_retryable());

        assert!(DispatchError::AllProvidersUnavailable.is_fast_reject());
    }

    #[test]
    fn test_provider_failure_retryability_follows_source() {
        let transient = DispatchError::ProviderFailed {
            provider: Arc::from("smtp-a"),
            attempts: 3,
            source: ProviderError::Transient("busy".to_string()),
        };
        assert!(transient.is_retryable());
        assert!(!transient.is_fast_reject());

        let permanent = DispatchError::ProviderFailed {
            provider: Arc::from("smtp-a"),
            attempts: 1,
            source: ProviderError::Permanent("rejected".to_string()),
        };
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_display() {
        let error = DispatchError::ProviderFailed {
            provider: Arc::from("smtp-a"),
            attempts: 3,
            source: ProviderError::Transient("server busy".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "delivery via smtp-a failed after 3 attempt(s): transient failure: server busy"
        );
    }
}
