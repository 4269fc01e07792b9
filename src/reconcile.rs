//! Merges what the classifier said back onto the batch it was asked about.
//!
//! Every row that was submitted comes out with a category and a confidence in `[0, 1]`, whether or
//! not the service answered for it, and every outcome is recorded in the cache.

use crate::cache::{CacheEntry, CacheStore};
use crate::classifier::ServiceItem;
use crate::model::{Categories, ClassificationResult, Source, Transaction};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// The outcome of reconciling one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciled {
    /// One result per submitted row, in batch order.
    pub results: Vec<ClassificationResult>,
    /// Rows the service answered with a usable category.
    pub classified: usize,
    /// Rows the service left out.
    pub fallback: usize,
    /// Rows whose answer named a category outside the vocabulary.
    pub out_of_vocabulary: usize,
    /// Items that referred to a row that was not in the batch.
    pub ignored: usize,
}

/// Matches `items` to the rows of `batch` by row id and writes each result into `cache`.
///
/// - A matched row takes the service's category and confidence (clamped into `[0, 1]`; missing
///   confidence becomes the fallback confidence).
/// - With strict categories, an unknown category becomes the fallback category and confidence.
/// - An unmatched row gets the fallback category and confidence.
/// - If the service repeats a row id, its first answer wins.
pub fn reconcile(
    batch: &[Transaction],
    items: Vec<ServiceItem>,
    categories: &Categories,
    cache: &mut CacheStore,
) -> Reconciled {
    let submitted: HashSet<usize> = batch.iter().map(|t| t.row_id()).collect();
    let mut by_row_id: HashMap<usize, ServiceItem> = HashMap::new();
    let mut out = Reconciled::default();
    for item in items {
        if !submitted.contains(&item.row_id) {
            out.ignored += 1;
            continue;
        }
        by_row_id.entry(item.row_id).or_insert(item);
    }
    if out.ignored > 0 {
        debug!(
            "Ignored {} items for rows that were not in the batch",
            out.ignored
        );
    }

    for txn in batch {
        let result = match by_row_id.remove(&txn.row_id()) {
            Some(item) => adopt(txn, item, categories),
            None => {
                debug!(
                    "No classification returned for row {}, using '{}'",
                    txn.row_id(),
                    categories.fallback()
                );
                fallback(txn, categories, Source::Fallback)
            }
        };

        match result.source {
            Source::Fallback => out.fallback += 1,
            Source::OutOfVocabulary => out.out_of_vocabulary += 1,
            Source::Service | Source::Cache => out.classified += 1,
        }

        cache.insert(
            txn.fingerprint(),
            CacheEntry::new(result.category.clone(), result.confidence),
        );
        out.results.push(result);
    }
    out
}

fn adopt(txn: &Transaction, item: ServiceItem, categories: &Categories) -> ClassificationResult {
    if categories.strict() && !categories.contains(&item.category) {
        warn!(
            "Row {} was classified as '{}', which is not a known category, using '{}'",
            txn.row_id(),
            item.category,
            categories.fallback()
        );
        return fallback(txn, categories, Source::OutOfVocabulary);
    }
    let confidence = item
        .confidence
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or_else(|| categories.fallback_confidence());
    ClassificationResult::new(txn.row_id(), item.category, confidence, Source::Service)
}

fn fallback(txn: &Transaction, categories: &Categories, source: Source) -> ClassificationResult {
    ClassificationResult::new(
        txn.row_id(),
        categories.fallback(),
        categories.fallback_confidence(),
        source,
    )
}
