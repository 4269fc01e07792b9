//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::api::{Fallthrough, Mode, TestService};
use crate::classifier::ClassifierClient;
use crate::config::{Settings, DEFAULT_CACHE, DEFAULT_INPUT, DEFAULT_OUTPUT};
use crate::model::Table;
use crate::pipeline::{Pipeline, RunSummary};
use crate::{Config, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch directory holding an input table, the cache and the output, plus a `TestService`
/// that every run in the environment shares. Holds the `TempDir` to keep the directory alive for
/// the duration of the test.
pub(crate) struct TestEnv {
    _temp_dir: TempDir,
    dir: PathBuf,
    service: TestService,
}

impl TestEnv {
    /// An environment with no input file and a service that answers every row with `Misc`, 0.5.
    pub(crate) fn new() -> Self {
        Self::with_service(Fallthrough::default())
    }

    pub(crate) fn with_service(fallthrough: Fallthrough) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            dir,
            service: TestService::new(fallthrough),
        }
    }

    /// An environment whose input is `csv`.
    pub(crate) fn with_csv(csv: &str) -> Self {
        let env = Self::new();
        env.write_input(csv);
        env
    }

    /// An environment whose input has `rows` distinct transactions.
    pub(crate) fn with_rows(rows: usize) -> Self {
        Self::with_csv(&Self::sample_csv(rows))
    }

    /// A table with `Date`, `Description`, `Amount` and `Account` columns and distinct rows.
    pub(crate) fn sample_csv(rows: usize) -> String {
        let mut csv = String::from("Date,Description,Amount,Account\n");
        for i in 0..rows {
            csv.push_str(&format!(
                "2024-01-{:02},Merchant {i},-{i}.25,Checking\n",
                i % 28 + 1
            ));
        }
        csv
    }

    pub(crate) fn write_input(&self, csv: &str) {
        std::fs::write(self.input(), csv).unwrap();
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn input(&self) -> PathBuf {
        self.dir.join(DEFAULT_INPUT)
    }

    pub(crate) fn output(&self) -> PathBuf {
        self.dir.join(DEFAULT_OUTPUT)
    }

    pub(crate) fn cache(&self) -> PathBuf {
        self.dir.join(DEFAULT_CACHE)
    }

    pub(crate) fn service(&self) -> &TestService {
        &self.service
    }

    /// A test-mode `Config` pointing into this environment.
    pub(crate) fn config(&self, settings: Settings) -> Config {
        Config::new(
            self.input(),
            self.output(),
            self.cache(),
            settings,
            Mode::Test,
            None,
        )
        .unwrap()
    }

    /// A classifier that talks to this environment's shared `TestService`.
    pub(crate) fn client(&self, settings: &Settings) -> ClassifierClient {
        ClassifierClient::new(
            Box::new(self.service.clone()),
            settings.model.clone(),
            &settings.categories().unwrap(),
            settings.retry_policy(),
        )
    }

    /// Runs the pipeline once with `settings`.
    pub(crate) async fn run(&self, settings: Settings) -> Result<RunSummary> {
        let client = self.client(&settings);
        let pipeline = Pipeline::new(self.config(settings), client)?;
        pipeline.run().await
    }

    pub(crate) fn read_output_text(&self) -> String {
        std::fs::read_to_string(self.output()).unwrap()
    }

    pub(crate) fn read_output(&self) -> Table {
        Table::parse(&self.read_output_text()).unwrap()
    }
}
