//! Provider rotation and failover

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crate::{circuit_breaker::CircuitBreaker, error::ConfigError, provider::Provider};

/// Ordered collection of providers with a circular cursor
///
/// The cursor marks the active provider. Rotation advances the cursor exactly
/// once per exhausted-retry failure; eligibility scans additionally skip
/// providers whose circuit is open. Rotation never removes a provider.
pub struct ProviderRotator {
    providers: Vec<Arc<dyn Provider>>,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for ProviderRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRotator")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}

impl ProviderRotator {
    /// Create a rotator over an ordered, non-empty provider collection
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProviders`] if the collection is empty.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        Ok(Self {
            providers,
            cursor: AtomicUsize::new(0),
        })
    }

    /// The provider currently under the cursor
    #[must_use]
    pub fn current(&self) -> Arc<dyn Provider> {
        let index = self.cursor.load(Ordering::Relaxed) % self.providers.len();
        Arc::clone(&self.providers[index])
    }

    /// Advance the cursor to the next provider, circularly
    pub fn advance(&self) {
        let next = (self.cursor.load(Ordering::Relaxed) + 1) % self.providers.len();
        self.cursor.store(next, Ordering::Relaxed);
        tracing::debug!(provider = %self.current().name(), "Rotated to next provider");
    }

    /// Find the first eligible provider starting from the cursor
    ///
    /// Scans circularly, skipping providers whose circuit rejects dispatch,
    /// and leaves the cursor on the provider returned. Returns `None` when
    /// every provider is ineligible.
    ///
    /// A successful scan may claim a half-open circuit's single recovery
    /// probe, so the caller must attempt delivery via the returned provider
    /// and report the outcome to the breaker.
    #[must_use]
    pub fn eligible(&self, breaker: &CircuitBreaker) -> Option<Arc<dyn Provider>> {
        let len = self.providers.len();
        let start = self.cursor.load(Ordering::Relaxed) % len;

        for offset in 0..len {
            let index = (start + offset) % len;
            let provider = &self.providers[index];
            if breaker.should_allow(provider.name()) {
                if offset > 0 {
                    self.cursor.store(index, Ordering::Relaxed);
                    tracing::debug!(
                        provider = %provider.name(),
                        skipped = offset,
                        "Skipped ineligible providers"
                    );
                }
                return Some(Arc::clone(provider));
            }
        }

        None
    }

    /// Number of configured providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Always `false`: construction requires at least one provider
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        circuit_breaker::CircuitBreakerConfig, message::Message, provider::ProviderError,
    };

    struct NamedProvider(&'static str);

    #[async_trait]
    impl Provider for NamedProvider {
        fn name(&self) -> &str {
            self.0
        }

        async fn attempt_delivery(&self, _message: &Message) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn rotator(names: &[&'static str]) -> ProviderRotator {
        let providers: Vec<Arc<dyn Provider>> = names
            .iter()
            .map(|name| Arc::new(NamedProvider(name)) as Arc<dyn Provider>)
            .collect();
        ProviderRotator::new(providers).unwrap()
    }

    #[test]
    fn test_empty_collection_is_rejected() {
        assert!(ProviderRotator::new(Vec::new()).is_err());
    }

    #[test]
    fn test_advance_wraps_around() {
        let rotator = rotator(&["a", "b", "c"]);

        assert_eq!(rotator.current().name(), "a");
        rotator.advance();
        assert_eq!(rotator.current().name(), "b");
        rotator.advance();
        assert_eq!(rotator.current().name(), "c");
        rotator.advance();
        assert_eq!(rotator.current().name(), "a");
    }

    #[test]
    fn test_eligible_skips_open_circuits() {
        let rotator = rotator(&["a", "b"]);
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            failure_window_secs: 60,
            cooldown_secs: 300,
        });

        breaker.record_failure("a");

        let chosen = rotator.eligible(&breaker).unwrap();
        assert_eq!(chosen.name(), "b");
        // Cursor followed the scan
        assert_eq!(rotator.current().name(), "b");
    }

    #[test]
    fn test_all_open_yields_none() {
        let rotator = rotator(&["a", "b"]);
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            failure_window_secs: 60,
            cooldown_secs: 300,
        });

        breaker.record_failure("a");
        breaker.record_failure("b");

        assert!(rotator.eligible(&breaker).is_none());
    }
}
