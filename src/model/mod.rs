//! Types that represent the core data model, such as `Transaction`, `Table` and `Categories`.
mod category;
mod table;
mod transaction;

pub use category::{
    Categories, DEFAULT_CATEGORIES, DEFAULT_FALLBACK, DEFAULT_FALLBACK_CONFIDENCE,
};
pub use table::{format_confidence, Table, AMOUNT, CATEGORY, CONFIDENCE, DESCRIPTION};
pub use transaction::{ClassificationResult, Source, Transaction};
