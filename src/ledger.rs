//! Append-only status ledger for dispatch outcomes

use std::{
    fmt::{self, Display},
    sync::Arc,
    time::SystemTime,
};

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Terminal status of one dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    /// Delivered by a provider
    Sent,
    /// Suppressed as a duplicate submission
    Duplicate,
    /// All attempts exhausted or the operation was cancelled
    Failed,
    /// Rejected before any provider was contacted (rate limit, no eligible
    /// provider)
    Rejected,
}

impl Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sent => "sent",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        };
        write!(f, "{label}")
    }
}

/// One ledger entry: the outcome of dispatching one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    /// The message as submitted
    pub message: Message,
    /// Terminal status
    pub status: DispatchStatus,
    /// Provider involved, if any was contacted
    pub provider: Option<Arc<str>>,
    /// When the outcome was recorded
    pub timestamp: SystemTime,
}

/// Append-only record of outcome per message
///
/// Entries are never mutated or deleted; retention is bounded only by the
/// process lifetime. Each append is atomic: concurrent readers never observe
/// a partially written entry.
#[derive(Debug, Default)]
pub struct StatusLedger {
    records: parking_lot::RwLock<Vec<StatusRecord>>,
}

impl StatusLedger {
    /// Create a new, empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome record
    pub fn record(
        &self,
        message: Message,
        status: DispatchStatus,
        provider: Option<Arc<str>>,
    ) {
        self.records.write().push(StatusRecord {
            message,
            status,
            provider,
            timestamp: SystemTime::now(),
        });
    }

    /// Snapshot of the current ledger contents
    ///
    /// A point-in-time copy for external reporting, not a live stream.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StatusRecord> {
        self.records.read().clone()
    }

    /// Number of recorded outcomes
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check whether the ledger is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
