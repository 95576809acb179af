//! Idempotency cache for suppressing duplicate submissions
//!
//! Tracks fingerprints of messages already accepted into the delivery
//! pipeline. Entries expire after a configurable retention window (a
//! business-level "resend window") so the cache stays bounded.

use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Deserialize, Serialize};

use crate::message::Fingerprint;

/// Configuration for idempotency deduplication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long a fingerprint is remembered (seconds)
    ///
    /// A resubmission of the same content after this window is treated as a
    /// new message.
    ///
    /// Default: 86400 seconds (24 hours)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

const fn default_retention_secs() -> u64 {
    86400
}

/// Set of fingerprints already accepted for delivery
///
/// Reservations are first-writer-wins: when two callers race on the same
/// fingerprint, exactly one observes "not seen". Distinct fingerprints never
/// block each other.
#[derive(Debug)]
pub struct IdempotencyCache {
    entries: DashMap<Fingerprint, Instant>,
    retention: Duration,
}

impl IdempotencyCache {
    /// Create a new, empty cache
    #[must_use]
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            entries: DashMap::new(),
            retention: Duration::from_secs(config.retention_secs),
        }
    }

    /// Atomically reserve a fingerprint
    ///
    /// Returns `true` if the fingerprint was not already reserved (the caller
    /// now owns the reservation), `false` if a live reservation exists.
    /// Expired reservations are treated as absent and taken over.
    pub fn try_reserve(&self, fingerprint: &Fingerprint) -> bool {
        match self.entries.entry(fingerprint.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().elapsed() >= self.retention {
                    *occupied.get_mut() = Instant::now();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                true
            }
        }
    }

    /// Drop a reservation
    ///
    /// Used when a reserved message terminally fails, so the caller may
    /// resubmit it.
    pub fn release(&self, fingerprint: &Fingerprint) {
        self.entries.remove(fingerprint);
    }

    /// Remove all reservations older than the retention window
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, reserved_at| reserved_at.elapsed() < self.retention);
        before.saturating_sub(self.entries.len())
    }

    /// Number of live and expired-but-unpurged reservations
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the cache holds no reservations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
