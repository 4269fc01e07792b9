use crate::fingerprint::{fingerprint, Fingerprint};
use serde::{Deserialize, Serialize};

/// A transaction as the classification pipeline sees it: its position in the input table, the two
/// fields that identify it, and (once known) its category and confidence.
///
/// The amount is kept exactly as it was written in the input file so that fingerprints do not
/// drift with number formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    row_id: usize,
    description: String,
    amount: String,
    category: Option<String>,
    confidence: Option<f64>,
}

impl Transaction {
    pub fn new(row_id: usize, description: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            row_id,
            description: description.into(),
            amount: amount.into(),
            category: None,
            confidence: None,
        }
    }

    /// Records a category and confidence that were already present in the input.
    pub(crate) fn set_existing(&mut self, category: Option<String>, confidence: Option<f64>) {
        self.category = category;
        self.confidence = confidence;
    }

    pub fn row_id(&self) -> usize {
        self.row_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.description, &self.amount)
    }
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A previous run's result, found in the cache.
    Cache,
    /// The external classification service.
    Service,
    /// The service omitted this row, so the fallback was applied.
    Fallback,
    /// The service answered with a category outside the vocabulary, so the fallback was applied.
    OutOfVocabulary,
}

serde_plain::derive_display_from_serialize!(Source);
serde_plain::derive_fromstr_from_deserialize!(Source);

/// The category and confidence settled on for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClassificationResult {
    pub row_id: usize,
    pub category: String,
    pub confidence: f64,
    pub source: Source,
}

impl ClassificationResult {
    pub fn new(
        row_id: usize,
        category: impl Into<String>,
        confidence: f64,
        source: Source,
    ) -> Self {
        Self {
            row_id,
            category: category.into(),
            confidence,
            source,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, Source::Fallback | Source::OutOfVocabulary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_transaction_fingerprint_uses_raw_amount_text() {
        let a = Transaction::new(0, "Rent", "-1500.00");
        let b = Transaction::new(9, "RENT", "-1500.00");
        let c = Transaction::new(0, "Rent", "-1500");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert!(a.category().is_none());
        assert!(a.confidence().is_none());
    }

    #[test]
    fn test_source_display_and_parse() {
        assert_eq!(Source::OutOfVocabulary.to_string(), "out_of_vocabulary");
        assert_eq!(Source::from_str("fallback").unwrap(), Source::Fallback);
    }

    #[test]
    fn test_is_fallback() {
        assert!(ClassificationResult::new(1, "Misc", 0.2, Source::Fallback).is_fallback());
        assert!(!ClassificationResult::new(1, "Food", 0.9, Source::Service).is_fallback());
    }
}
