//! Configurable mock provider for testing dispatch scenarios
//!
//! Supports scripting failures per attempt or per recipient, injecting
//! delivery delays, and tracking attempts for verification.
#![allow(dead_code)] // Test utility module - not all knobs used in every test

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use courier::{Message, Provider, ProviderError};

/// A scripted delivery provider
///
/// By default every attempt succeeds. Builder-style knobs inject failures:
///
/// ```ignore
/// let provider = MockProvider::new("primary")
///     .fail_first(3)                       // transient-fail attempts 1..=3
///     .fail_recipient("bad@example.com");  // always fail this recipient
/// ```
pub struct MockProvider {
    name: String,
    fail_first: usize,
    permanent: bool,
    fail_recipient: Option<String>,
    delay: Option<Duration>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<Message>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_first: 0,
            permanent: false,
            fail_recipient: None,
            delay: None,
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `n` attempts with a transient error, then succeed
    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Fail every attempt with a transient error
    pub fn always_fail(mut self) -> Self {
        self.fail_first = usize::MAX;
        self
    }

    /// Report failures as permanent instead of transient
    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    /// Fail (transiently) every attempt addressed to this recipient
    pub fn fail_recipient(mut self, to: impl Into<String>) -> Self {
        self.fail_recipient = Some(to.into());
        self
    }

    /// Sleep this long inside each delivery attempt
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total delivery attempts made against this provider
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Messages successfully delivered, in delivery order
    pub fn delivered(&self) -> Vec<Message> {
        self.delivered.lock().unwrap().clone()
    }

    fn failure(&self, reason: &str) -> ProviderError {
        if self.permanent {
            ProviderError::Permanent(reason.to_string())
        } else {
            ProviderError::Transient(reason.to_string())
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_delivery(&self, message: &Message) -> Result<(), ProviderError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(recipient) = &self.fail_recipient
            && &message.to == recipient
        {
            return Err(self.failure("recipient unavailable"));
        }

        if attempt <= self.fail_first {
            return Err(self.failure("simulated outage"));
        }

        self.delivered.lock().unwrap().push(message.clone());
        Ok(())
    }
}
