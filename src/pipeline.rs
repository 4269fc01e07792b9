//! The end-to-end classification run.
//!
//! A run loads the input table, resolves every row it can from the cache, classifies the rest in
//! batches, and writes the output table. The cache is saved after every batch, so a run that fails
//! part way resumes from the first batch that did not complete.

use crate::batch::chunk;
use crate::cache::CacheStore;
use crate::classifier::ClassifierClient;
use crate::fingerprint::Fingerprint;
use crate::model::{Categories, ClassificationResult, Source, Table, Transaction};
use crate::model::{CATEGORY, CONFIDENCE};
use crate::reconcile::reconcile;
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Counts describing a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Rows in the input table.
    pub total: usize,
    /// Rows resolved from the cache without calling the service.
    pub cached: usize,
    /// Rows the service classified into a known category.
    pub classified: usize,
    /// Rows the service did not answer for.
    pub fallback: usize,
    /// Rows whose answer was outside the vocabulary.
    pub out_of_vocabulary: usize,
    /// Requests that were needed, not counting retries. Rows that repeat an earlier row are sent
    /// once.
    pub batches: usize,
    /// Where the classified table was written.
    pub output: PathBuf,
}

/// Runs the classification of one input table.
pub struct Pipeline {
    config: Config,
    classifier: ClassifierClient,
    categories: Categories,
}

impl Pipeline {
    pub fn new(config: Config, classifier: ClassifierClient) -> Result<Self> {
        let categories = config.settings().categories()?;
        Ok(Self {
            config,
            classifier,
            categories,
        })
    }

    /// Classifies every row of the input table and writes the output table.
    ///
    /// # Errors
    /// - The input cannot be read or lacks a `Description` or `Amount` column.
    /// - A batch fails on every attempt. Batches completed before it stay in the cache.
    /// - The cache or the output cannot be written.
    pub async fn run(mut self) -> Result<RunSummary> {
        let input = self.config.input().to_path_buf();
        let mut table = Table::load(&input)
            .await
            .with_context(|| format!("Unable to load the input table {}", input.display()))?;
        table
            .require_columns()
            .with_context(|| format!("The input table {} cannot be classified", input.display()))?;
        table.ensure_column(CATEGORY);
        table.ensure_column(CONFIDENCE);
        let transactions = table.transactions()?;
        info!(
            "Loaded {} transactions from {}",
            transactions.len(),
            input.display()
        );
        let prior = transactions
            .iter()
            .filter(|t| t.category().is_some())
            .count();
        if prior > 0 {
            debug!("{prior} rows already have a category, which will be replaced");
        }

        let mut cache = CacheStore::load(self.config.cache()).await?;
        let mut summary = RunSummary {
            total: transactions.len(),
            output: self.config.output().to_path_buf(),
            ..RunSummary::default()
        };

        // One representative per fingerprint is sent; its result is copied to the other rows.
        let mut misses: Vec<Transaction> = Vec::new();
        let mut duplicates: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut representative: HashMap<Fingerprint, usize> = HashMap::new();
        for txn in transactions {
            let fingerprint = txn.fingerprint();
            if let Some(entry) = cache.get(&fingerprint) {
                let result = ClassificationResult::new(
                    txn.row_id(),
                    entry.category.clone(),
                    entry.confidence,
                    Source::Cache,
                );
                table.apply(&result)?;
                summary.cached += 1;
                continue;
            }
            match representative.entry(fingerprint) {
                Entry::Occupied(e) => duplicates.entry(*e.get()).or_default().push(txn.row_id()),
                Entry::Vacant(e) => {
                    e.insert(txn.row_id());
                    misses.push(txn);
                }
            }
        }
        info!(
            "{} transactions found in the cache, {} to classify",
            summary.cached,
            summary.total - summary.cached
        );
        if !duplicates.is_empty() {
            debug!(
                "{} rows repeat an earlier row and will share its classification",
                duplicates.values().map(Vec::len).sum::<usize>()
            );
        }

        let batches = chunk(&misses, self.config.settings().batch_size);
        let n = batches.len();
        summary.batches = n;
        for (ix, batch) in batches.iter().enumerate() {
            let i = ix + 1;
            debug!("Classifying batch {i}/{n} with {} rows", batch.len());
            let items = self
                .classifier
                .classify(batch)
                .await
                .with_context(|| format!("Batch {i}/{n} could not be classified"))?;
            let reconciled = reconcile(batch, items, &self.categories, &mut cache);
            for result in &reconciled.results {
                let copies = duplicates.remove(&result.row_id).unwrap_or_default();
                let rows = 1 + copies.len();
                table.apply(result)?;
                for row_id in copies {
                    table.apply(&ClassificationResult {
                        row_id,
                        ..result.clone()
                    })?;
                }
                match result.source {
                    Source::OutOfVocabulary => summary.out_of_vocabulary += rows,
                    _ if result.is_fallback() => summary.fallback += rows,
                    _ => summary.classified += rows,
                }
            }
            cache.save().await?;

            debug!(
                "Batch {i}/{n}: {} classified, {} fallback, {} out of vocabulary",
                reconciled.classified, reconciled.fallback, reconciled.out_of_vocabulary
            );
            info!("Batch {i}/{n} complete");
        }

        table.save(self.config.output()).await.with_context(|| {
            format!(
                "Unable to write the output table {}",
                self.config.output().display()
            )
        })?;
        info!(
            "Saved {} classified transactions to {}",
            summary.total,
            summary.output.display()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Fallthrough;
    use crate::config::Settings;
    use crate::test::TestEnv;

    fn settings(batch_size: usize) -> Settings {
        Settings {
            batch_size,
            max_attempts: 2,
            backoff_base_ms: 1,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_first_run_classifies_everything() {
        let env = TestEnv::with_rows(5);
        let summary = env.run(settings(2)).await.unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.cached, 0);
        assert_eq!(summary.classified, 5);
        assert_eq!(summary.batches, 3);
        assert_eq!(env.service().calls(), 3);

        let output = env.read_output();
        assert_eq!(output.len(), 5);
        for row in 0..5 {
            assert_eq!(output.cell(row, CATEGORY), Some("Misc"));
            assert_eq!(output.cell(row, CONFIDENCE), Some("0.5"));
        }
    }

    #[tokio::test]
    async fn test_second_run_makes_no_calls() {
        let env = TestEnv::with_rows(7);
        env.run(settings(3)).await.unwrap();
        let first = env.read_output_text();
        let calls = env.service().calls();

        let summary = env.run(settings(3)).await.unwrap();
        assert_eq!(env.service().calls(), calls);
        assert_eq!(summary.cached, 7);
        assert_eq!(summary.batches, 0);
        assert_eq!(env.read_output_text(), first);
    }

    #[tokio::test]
    async fn test_resumes_after_failed_batch() {
        // 10 rows in batches of 3 is 4 batches. The third batch fails twice, exhausting it.
        let env = TestEnv::with_rows(10);
        let echo = |ids: &[usize]| {
            let items: Vec<String> = ids
                .iter()
                .map(|i| format!(r#"{{"row_id": {i}, "category": "Food", "confidence": 0.9}}"#))
                .collect();
            format!(r#"{{"items": [{}]}}"#, items.join(","))
        };
        env.service()
            .push_text(echo(&[0, 1, 2]))
            .push_text(echo(&[3, 4, 5]))
            .push_failure("down")
            .push_failure("still down");

        let err = env.run(settings(3)).await.unwrap_err();
        assert!(format!("{err:#}").contains("Batch 3/4"), "{err:#}");
        assert_eq!(env.service().calls(), 4);
        assert!(!env.output().exists());

        let summary = env.run(settings(3)).await.unwrap();
        assert_eq!(summary.cached, 6);
        assert_eq!(summary.batches, 2);
        // Two more calls for the two remaining batches.
        assert_eq!(env.service().calls(), 6);
        let output = env.read_output();
        assert_eq!(output.cell(0, CATEGORY), Some("Food"));
        assert_eq!(output.cell(9, CATEGORY), Some("Misc"));
    }

    #[tokio::test]
    async fn test_schema_is_preserved() {
        let env = TestEnv::with_csv(
            "Date,Description,Amount,Account,Note\n\
            2024-01-02,Coffee Shop,-4.50,Checking,\n\
            2024-01-03,Payroll,2500.00,Checking,monthly\n",
        );
        env.run(settings(30)).await.unwrap();
        let output = env.read_output();
        assert_eq!(
            output.headers(),
            &["Date", "Description", "Amount", "Account", "Note", "Category", "Confidence"]
        );
        assert_eq!(output.len(), 2);
        assert_eq!(output.cell(1, "Note"), Some("monthly"));
        assert_eq!(output.cell(0, "Date"), Some("2024-01-02"));
    }

    #[tokio::test]
    async fn test_existing_category_columns_are_reused() {
        let env = TestEnv::with_csv(
            "Description,Category,Amount,Confidence\n\
            Grocer,Food,-20.00,0.99\n",
        );
        env.run(settings(30)).await.unwrap();
        let output = env.read_output();
        assert_eq!(
            output.headers(),
            &["Description", "Category", "Amount", "Confidence"]
        );
        assert_eq!(output.cell(0, CATEGORY), Some("Misc"));
        assert_eq!(output.cell(0, CONFIDENCE), Some("0.5"));
    }

    #[tokio::test]
    async fn test_omitted_rows_fall_back() {
        let env = TestEnv::with_rows(3);
        env.service().push_text(
            r#"```json
            {"items": [{"row_id": 0, "category": "Food", "confidence": 0.85},
                       {"row_id": 1, "category": "Shopping", "confidence": 0.6}]}
            ```"#,
        );
        let summary = env.run(settings(30)).await.unwrap();
        assert_eq!(summary.classified, 2);
        assert_eq!(summary.fallback, 1);
        let output = env.read_output();
        assert_eq!(output.cell(0, CATEGORY), Some("Food"));
        assert_eq!(output.cell(0, CONFIDENCE), Some("0.85"));
        assert_eq!(output.cell(2, CATEGORY), Some("Misc"));
        assert_eq!(output.cell(2, CONFIDENCE), Some("0.2"));
    }

    #[tokio::test]
    async fn test_out_of_vocabulary_is_counted() {
        let env = TestEnv::with_rows(1);
        env.service()
            .push_text(r#"{"items": [{"row_id": 0, "category": "Groceries", "confidence": 0.9}]}"#);
        let summary = env.run(settings(30)).await.unwrap();
        assert_eq!(summary.out_of_vocabulary, 1);
        assert_eq!(env.read_output().cell(0, CATEGORY), Some("Misc"));
    }

    #[tokio::test]
    async fn test_missing_columns_fail_before_any_call() {
        let env = TestEnv::with_csv("Date,Memo,Value\n2024-01-01,Coffee,-3.00\n");
        let err = env.run(settings(30)).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Description"), "{message}");
        assert!(message.contains("Memo"), "{message}");
        assert_eq!(env.service().calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_table() {
        let env = TestEnv::with_csv("Description,Amount\n");
        let summary = env.run(settings(30)).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.batches, 0);
        assert_eq!(env.service().calls(), 0);
        assert_eq!(
            env.read_output().headers(),
            &["Description", "Amount", "Category", "Confidence"]
        );
    }

    #[tokio::test]
    async fn test_identical_rows_share_a_cache_entry() {
        let env = TestEnv::with_csv(
            "Description,Amount\n\
            Coffee Shop,-4.50\n\
            coffee shop ,-4.50\n",
        );
        env.run(settings(30)).await.unwrap();
        let cache = CacheStore::load(env.cache()).await.unwrap();
        assert_eq!(cache.len(), 1);
        let state = env.service().get_state();
        assert_eq!(state.requests.len(), 1);
        assert_eq!(state.requests[0].rows.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_rows_share_the_answer_across_runs() {
        let env = TestEnv::with_csv(
            "Description,Amount\n\
            Starbucks,-5.00\n\
            Starbucks,-5.00\n",
        );
        env.service()
            .push_text(r#"{"items": [{"row_id": 0, "category": "Food", "confidence": 0.9}]}"#);
        let summary = env.run(settings(30)).await.unwrap();
        assert_eq!(summary.classified, 2);
        assert_eq!(summary.fallback, 0);
        let first = env.read_output_text();
        assert_eq!(
            first,
            "Description,Amount,Category,Confidence\n\
            Starbucks,-5.00,Food,0.9\n\
            Starbucks,-5.00,Food,0.9\n"
        );
        let cache = CacheStore::load(env.cache()).await.unwrap();
        let entry = cache.get(&crate::fingerprint::fingerprint("Starbucks", "-5.00"));
        assert_eq!(entry, Some(&crate::cache::CacheEntry::new("Food", 0.9)));

        let summary = env.run(settings(30)).await.unwrap();
        assert_eq!(summary.cached, 2);
        assert_eq!(env.service().calls(), 1);
        assert_eq!(env.read_output_text(), first);
    }

    #[tokio::test]
    async fn test_repeated_rows_across_batches_are_sent_once() {
        let env = TestEnv::with_csv(
            "Description,Amount\n\
            Rent,-1500\n\
            Grocer,-20\n\
            Rent,-1500\n",
        );
        let summary = env.run(settings(1)).await.unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.classified, 3);
        assert_eq!(env.service().calls(), 2);
        assert_eq!(env.read_output().cell(2, CATEGORY), Some("Misc"));
        assert_eq!(env.read_output().cell(2, CONFIDENCE), Some("0.5"));
    }

    #[tokio::test]
    async fn test_failing_service_fails_the_run() {
        let env = TestEnv::with_service(Fallthrough::Fail);
        env.write_input(&TestEnv::sample_csv(2));
        assert!(env.run(settings(30)).await.is_err());
        assert_eq!(env.service().calls(), 2);
        assert!(!env.cache().exists());
    }
}
