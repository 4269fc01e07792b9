use crate::Result;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// The category vocabulary used when no other list is configured.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Income",
    "Transfer",
    "Housing",
    "Transportation",
    "Food",
    "Health",
    "Shopping",
    "Entertainment",
    "Travel",
    "Financial",
    "Education",
    "Gifts",
    "Business",
    "Misc",
];

/// The bucket for rows the classifier did not (or could not validly) answer for.
pub const DEFAULT_FALLBACK: &str = "Misc";

/// The confidence recorded alongside a fallback assignment.
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.2;

/// The fixed set of categories a transaction can be assigned, plus the fallback policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Categories {
    names: Vec<String>,
    fallback: String,
    fallback_confidence: f64,
    /// When true, a category outside `names` returned by the service is replaced by the fallback.
    strict: bool,
}

impl Default for Categories {
    fn default() -> Self {
        Self {
            names: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            fallback: DEFAULT_FALLBACK.to_string(),
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
            strict: true,
        }
    }
}

impl Categories {
    pub fn new<S, I>(
        names: I,
        fallback: impl Into<String>,
        fallback_confidence: f64,
        strict: bool,
    ) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = S>,
    {
        let categories = Self {
            names: names.into_iter().map(|s| s.into()).collect(),
            fallback: fallback.into(),
            fallback_confidence,
            strict,
        };
        categories.validate()?;
        Ok(categories)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.names.is_empty(), "The category list must not be empty");
        ensure!(
            self.contains(&self.fallback),
            "The fallback category '{}' is not in the category list",
            self.fallback
        );
        ensure!(
            (0.0..=1.0).contains(&self.fallback_confidence),
            "The fallback confidence must be between 0 and 1, got {}",
            self.fallback_confidence
        );
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn fallback_confidence(&self) -> f64 {
        self.fallback_confidence
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Exact, case-sensitive membership. Downstream reports group by the literal string.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vocabulary() {
        let c = Categories::default();
        assert_eq!(c.names().len(), 14);
        assert_eq!(c.fallback(), "Misc");
        assert_eq!(c.fallback_confidence(), 0.2);
        assert!(c.strict());
        assert!(c.contains("Transfer"));
        assert!(!c.contains("transfer"));
    }

    #[test]
    fn test_fallback_must_be_in_list() {
        let err = Categories::new(vec!["Food", "Travel"], "Misc", 0.2, true).unwrap_err();
        assert!(err.to_string().contains("Misc"));
    }

    #[test]
    fn test_empty_list_rejected() {
        assert!(Categories::new(Vec::<String>::new(), "Misc", 0.2, true).is_err());
    }

    #[test]
    fn test_fallback_confidence_range() {
        assert!(Categories::new(vec!["Misc"], "Misc", 1.5, true).is_err());
        assert!(Categories::new(vec!["Misc"], "Misc", -0.1, true).is_err());
        assert!(Categories::new(vec!["Misc"], "Misc", 0.0, false).is_ok());
    }
}
