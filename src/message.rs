//! Message model and content fingerprinting

use std::{
    fmt::{self, Display},
    hash::{BuildHasher, Hasher},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Fixed hasher seeds so equal messages fingerprint identically across
/// process restarts.
const FINGERPRINT_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// A discrete message to be delivered
///
/// Immutable once submitted. Identity for deduplication purposes is derived
/// via [`Message::fingerprint`], never stored on the message itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Message body
    pub body: String,
}

impl Message {
    /// Create a new message
    #[must_use]
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Derive the deduplication fingerprint for this message
    ///
    /// Deterministic over `(to, subject, body)`: equal field triples always
    /// produce equal fingerprints. Fields are length-delimited before hashing
    /// so content cannot alias across field boundaries.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let state = ahash::RandomState::with_seeds(
            FINGERPRINT_SEEDS.0,
            FINGERPRINT_SEEDS.1,
            FINGERPRINT_SEEDS.2,
            FINGERPRINT_SEEDS.3,
        );
        let mut hasher = state.build_hasher();

        for field in [&self.to, &self.subject, &self.body] {
            hasher.write_usize(field.len());
            hasher.write(field.as_bytes());
        }

        Fingerprint(Arc::from(format!("{:016x}", hasher.finish())))
    }
}

/// Deterministic key derived from message content, used for deduplication
///
/// A newtype wrapper to prevent accidentally passing arbitrary strings where
/// a fingerprint is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Fingerprint(Arc<str>);

impl Fingerprint {
    /// Get the fingerprint as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
