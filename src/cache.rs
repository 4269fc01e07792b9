//! The persistent classification cache.
//!
//! The cache maps a transaction `Fingerprint` to the category and confidence it was assigned. It is
//! loaded once per run, consulted for every row, and rewritten in full after every batch so that an
//! interrupted run loses at most the batch that was in flight.
//!
//! On disk it is a pretty-printed JSON object:
//! ```json
//! {
//!   "3f1c...": { "category": "Food", "confidence": 0.85 }
//! }
//! ```

use crate::fingerprint::Fingerprint;
use crate::{utils, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A cached classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub category: String,
    pub confidence: f64,
}

impl CacheEntry {
    pub fn new(category: impl Into<String>, confidence: f64) -> Self {
        Self {
            category: category.into(),
            confidence,
        }
    }
}

/// The fingerprint → classification mapping and the file it lives in.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    entries: BTreeMap<Fingerprint, CacheEntry>,
}

impl CacheStore {
    /// An empty cache that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Loads the cache at `path`. A missing, unreadable or unparseable file is an empty cache.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self::new(path.clone());
        if !path.exists() {
            debug!("No cache file at {}, starting empty", path.display());
            return Ok(store);
        }

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Unable to read cache file {}, starting empty: {e}",
                    path.display()
                );
                return Ok(store);
            }
        };

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Cache file {} is not a valid cache, starting empty: {e}",
                    path.display()
                );
                return Ok(store);
            }
        };

        let mut skipped = 0usize;
        for (key, value) in raw {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => {
                    store.entries.insert(Fingerprint::from(key), entry);
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                "Skipped {skipped} malformed entr{} in cache file {}",
                if skipped == 1 { "y" } else { "ies" },
                path.display()
            );
        }
        debug!(
            "Loaded {} cache entries from {}",
            store.entries.len(),
            path.display()
        );
        Ok(store)
    }

    /// Rewrites the whole cache file, atomically with respect to crashes.
    pub async fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize the classification cache")?;
        utils::write_atomic(&self.path, json)
            .await
            .with_context(|| format!("Unable to save cache file {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&CacheEntry> {
        self.entries.get(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Records a classification. Returns the entry it replaced, if any.
    pub fn insert(&mut self, fingerprint: Fingerprint, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(fingerprint, entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &CacheEntry)> {
        self.entries.iter()
    }

    /// Keeps only the entries for which `keep` returns true. Returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Fingerprint, &CacheEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, v| keep(k, v));
        before - self.entries.len()
    }
}
