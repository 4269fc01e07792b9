//! Content-addressed keys for transactions.
//!
//! A `Fingerprint` identifies a transaction by what it says, not where it sits in a file: two rows
//! with the same description and amount text (ignoring surrounding whitespace and case) share a
//! fingerprint in every process and every run. It is the cache key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};

/// A SHA-256 digest of a transaction's normalized `(description, amount)` text, as lowercase hex.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Computes the fingerprint of a transaction from its description and the original text of its
/// amount.
pub fn fingerprint(description: &str, amount: &str) -> Fingerprint {
    let raw = format!("{}|{}", normalize(description), normalize(amount));
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
