//! These structs provide the CLI interface for the txclass CLI.

use crate::config::{DEFAULT_CACHE, DEFAULT_INPUT, DEFAULT_OUTPUT};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;

/// txclass: Classify bank transactions into spending categories.
///
/// Reads a CSV of transactions with at least `Description` and `Amount` columns, assigns each row
/// a category and a confidence using a language model, and writes the table back out with
/// `Category` and `Confidence` columns filled in. Results are cached by transaction fingerprint,
/// so running it again only classifies rows it has not seen before.
///
/// The API key is read from API_KEY, OPENAI_API_KEY or API_TOKEN, in that order. A `.env` file in
/// the working directory is loaded first. Set TXCLASS_IN_TEST_MODE to run against an offline
/// test service instead.
#[derive(Debug, Parser, Clone)]
#[command(version)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Classify the transactions in the input table and write the output table.
    ///
    /// Rows already in the cache are filled in without calling the service. The rest are sent in
    /// batches; the cache is saved after each batch so an interrupted run picks up where it left
    /// off.
    Classify(ClassifyArgs),
    /// Print the category vocabulary and the fallback category.
    Categories(CategoriesArgs),
    /// Inspect or prune the classification cache.
    Cache(CacheArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG. See the tracing-subscriber EnvFilter documentation.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
}

impl Common {
    pub fn new(log_level: LevelFilter) -> Self {
        Self { log_level }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }
}

/// Args for the `txclass classify` command.
#[derive(Debug, Parser, Clone)]
pub struct ClassifyArgs {
    /// The CSV file to classify.
    #[arg(long, env = "TXCLASS_INPUT", default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Where to write the classified CSV.
    #[arg(long, env = "TXCLASS_OUTPUT", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// The classification cache file.
    #[arg(long, env = "TXCLASS_CACHE", default_value = DEFAULT_CACHE)]
    cache: PathBuf,

    /// A JSON settings file. Flags given on the command line override its values.
    #[arg(long, env = "TXCLASS_CONFIG")]
    config: Option<PathBuf>,

    /// The model to classify with.
    #[arg(long, env = "TXCLASS_MODEL")]
    model: Option<String>,

    /// The base URL of the classification service.
    #[arg(long, env = "TXCLASS_BASE_URL")]
    base_url: Option<String>,

    /// Rows per request.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Attempts per batch before giving up.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Keep categories the service invents instead of replacing them with the fallback.
    #[arg(long)]
    lenient_categories: bool,
}

impl ClassifyArgs {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        cache: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            cache: cache.into(),
            config: None,
            model: None,
            base_url: None,
            batch_size: None,
            max_attempts: None,
            lenient_categories: false,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn lenient_categories(&self) -> bool {
        self.lenient_categories
    }
}

/// Args for the `txclass categories` command.
#[derive(Debug, Parser, Clone)]
pub struct CategoriesArgs {
    /// A JSON settings file that defines the vocabulary.
    #[arg(long, env = "TXCLASS_CONFIG")]
    config: Option<PathBuf>,
}

impl CategoriesArgs {
    pub fn new(config: Option<PathBuf>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Args for the `txclass cache` command.
#[derive(Debug, Parser, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    action: CacheSubcommand,
}

impl CacheArgs {
    pub fn new(action: CacheSubcommand) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &CacheSubcommand {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheSubcommand {
    /// Show how many entries the cache holds, per category.
    Stats(CacheStatsArgs),
    /// Remove entries below a confidence threshold so they are classified again on the next run.
    ///
    /// The cache file is backed up first, into a `backups` directory beside it.
    Prune(CachePruneArgs),
}

/// Args for the `txclass cache stats` command.
#[derive(Debug, Parser, Clone)]
pub struct CacheStatsArgs {
    /// The classification cache file.
    #[arg(long, env = "TXCLASS_CACHE", default_value = DEFAULT_CACHE)]
    cache: PathBuf,

    /// A JSON settings file that defines the fallback category.
    #[arg(long, env = "TXCLASS_CONFIG")]
    config: Option<PathBuf>,
}

impl CacheStatsArgs {
    pub fn new(cache: impl Into<PathBuf>, config: Option<PathBuf>) -> Self {
        Self {
            cache: cache.into(),
            config,
        }
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Args for the `txclass cache prune` command.
#[derive(Debug, Parser, Clone)]
pub struct CachePruneArgs {
    /// Entries with a confidence below this value are removed.
    #[arg(long)]
    below: f64,

    /// The classification cache file.
    #[arg(long, env = "TXCLASS_CACHE", default_value = DEFAULT_CACHE)]
    cache: PathBuf,
}

impl CachePruneArgs {
    pub fn new(below: f64, cache: impl Into<PathBuf>) -> Self {
        Self {
            below,
            cache: cache.into(),
        }
    }

    pub fn below(&self) -> f64 {
        self.below
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_defaults() {
        let args = Args::try_parse_from(["txclass", "classify"]).unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::INFO);
        let Command::Classify(c) = args.command() else {
            panic!("expected classify");
        };
        assert_eq!(c.input(), Path::new("mastersheet.csv"));
        assert_eq!(c.output(), Path::new("mastersheet_classified.csv"));
        assert_eq!(c.cache(), Path::new("classification_cache.json"));
        assert!(c.config().is_none());
        assert!(c.batch_size().is_none());
        assert!(!c.lenient_categories());
    }

    #[test]
    fn test_classify_flags() {
        let args = Args::try_parse_from([
            "txclass",
            "--log-level",
            "debug",
            "classify",
            "--input",
            "in.csv",
            "--batch-size",
            "10",
            "--max-attempts",
            "3",
            "--model",
            "gpt-4o-mini",
            "--lenient-categories",
        ])
        .unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        let Command::Classify(c) = args.command() else {
            panic!("expected classify");
        };
        assert_eq!(c.input(), Path::new("in.csv"));
        assert_eq!(c.batch_size(), Some(10));
        assert_eq!(c.max_attempts(), Some(3));
        assert_eq!(c.model(), Some("gpt-4o-mini"));
        assert!(c.lenient_categories());
    }

    #[test]
    fn test_cache_prune() {
        let args =
            Args::try_parse_from(["txclass", "cache", "prune", "--below", "0.3"]).unwrap();
        let Command::Cache(c) = args.command() else {
            panic!("expected cache");
        };
        let CacheSubcommand::Prune(p) = c.action() else {
            panic!("expected prune");
        };
        assert_eq!(p.below(), 0.3);
        assert_eq!(p.cache(), Path::new("classification_cache.json"));
    }

    #[test]
    fn test_prune_requires_threshold() {
        assert!(Args::try_parse_from(["txclass", "cache", "prune"]).is_err());
    }
}
