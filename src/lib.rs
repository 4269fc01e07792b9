//! Classifies bank transactions into a fixed set of spending categories.
//!
//! The pipeline reads a CSV table, fingerprints each transaction, resolves what it can from a
//! persistent cache, and sends the rest to a language model in batches. Every row comes back with a
//! category and a confidence, and the table is written back out with its original columns intact.

pub mod api;
pub mod args;
mod backup;
pub mod batch;
pub mod cache;
pub mod classifier;
pub mod commands;
mod config;
mod error;
pub mod fingerprint;
pub mod model;
pub mod pipeline;
pub mod reconcile;
mod utils;

#[cfg(test)]
mod test;

pub use api::Mode;
pub use config::{Config, Credential, Settings};
pub use error::{ClassifyError, Error, Result};
pub use pipeline::{Pipeline, RunSummary};
