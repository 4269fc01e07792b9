//! Configuration for a classification run.
//!
//! A `Config` is built once, from an optional JSON settings file, command line overrides and the
//! process environment, and is then handed to the pipeline. Nothing reads process-wide constants
//! after that point.

use crate::api::Mode;
use crate::args::ClassifyArgs;
use crate::classifier::RetryPolicy;
use crate::model::{Categories, DEFAULT_CATEGORIES, DEFAULT_FALLBACK, DEFAULT_FALLBACK_CONFIDENCE};
use crate::{utils, Result};
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_INPUT: &str = "mastersheet.csv";
pub const DEFAULT_OUTPUT: &str = "mastersheet_classified.csv";
pub const DEFAULT_CACHE: &str = "classification_cache.json";
pub const DEFAULT_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_BATCH_SIZE: usize = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Environment variables checked for the service credential, in order.
pub const CREDENTIAL_VARS: &[&str] = &["API_KEY", "OPENAI_API_KEY", "API_TOKEN"];

/// The secret used to authenticate with the classification service. Its `Debug` output is
/// redacted.
#[derive(Clone, Eq, PartialEq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    /// The first non-empty variable of `CREDENTIAL_VARS`. A `.env` file in the working directory
    /// is loaded into the environment first, if there is one.
    pub fn from_env() -> Option<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        CREDENTIAL_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .map(Self)
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Tunables for the pipeline. Every field is optional in the settings file and falls back to its
/// default.
///
/// Example settings file:
/// ```json
/// {
///   "model": "gpt-5-mini",
///   "batch_size": 30,
///   "max_attempts": 5,
///   "backoff_base_ms": 1000,
///   "categories": ["Income", "Transfer", "Food", "Misc"],
///   "fallback_category": "Misc",
///   "fallback_confidence": 0.2,
///   "strict_categories": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// The model identifier sent with each request.
    pub model: String,
    /// Scheme and host of the classification service.
    pub base_url: String,
    /// Rows per request.
    pub batch_size: usize,
    /// Attempts per batch before the run is abandoned.
    pub max_attempts: u32,
    /// The wait after the first failed attempt; it doubles after each further failure.
    pub backoff_base_ms: u64,
    /// The category vocabulary.
    pub categories: Vec<String>,
    /// Category for rows the service does not answer for. Must be in `categories`.
    pub fallback_category: String,
    /// Confidence recorded with the fallback category.
    pub fallback_confidence: f64,
    /// Replace categories outside the vocabulary with the fallback.
    pub strict_categories: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            fallback_category: DEFAULT_FALLBACK.to_string(),
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
            strict_categories: true,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = utils::read_bytes(path).await?;
        let settings: Settings = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse settings file at {}", path.display()))?;
        Ok(settings)
    }

    /// Loads `path` if given, otherwise returns the defaults.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p).await,
            None => Ok(Self::default()),
        }
    }

    /// Checks the settings for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be at least 1");
        ensure!(self.max_attempts > 0, "max_attempts must be at least 1");
        ensure!(!self.model.trim().is_empty(), "model must not be empty");
        self.categories()?;
        Ok(())
    }

    pub fn categories(&self) -> Result<Categories> {
        Categories::new(
            self.categories.iter().cloned(),
            self.fallback_category.clone(),
            self.fallback_confidence,
            self.strict_categories,
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
        )
    }
}

/// Everything a classification run needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    input: PathBuf,
    output: PathBuf,
    cache: PathBuf,
    settings: Settings,
    mode: Mode,
    credential: Option<Credential>,
}

impl Config {
    /// Creates a validated `Config`. In live mode a credential is required.
    ///
    /// # Errors
    /// - The settings are invalid.
    /// - `mode` is `Mode::Live` and `credential` is `None`.
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        cache: impl Into<PathBuf>,
        settings: Settings,
        mode: Mode,
        credential: Option<Credential>,
    ) -> Result<Self> {
        settings.validate().context("Invalid settings")?;
        if mode == Mode::Live {
            ensure!(
                credential.is_some(),
                "API key not found. Set one of {CREDENTIAL_VARS:?} in the environment or in a \
                .env file"
            );
        }
        Ok(Self {
            input: input.into(),
            output: output.into(),
            cache: cache.into(),
            settings,
            mode,
            credential,
        })
    }

    /// Builds the configuration for `txclass classify`. Values come from the settings file, if
    /// any, then from flags. The credential is read from the environment in live mode only.
    pub async fn load(args: &ClassifyArgs, mode: Mode) -> Result<Self> {
        let mut settings = Settings::load_or_default(args.config()).await?;
        if let Some(model) = args.model() {
            settings.model = model.to_string();
        }
        if let Some(base_url) = args.base_url() {
            settings.base_url = base_url.to_string();
        }
        if let Some(batch_size) = args.batch_size() {
            settings.batch_size = batch_size;
        }
        if let Some(max_attempts) = args.max_attempts() {
            settings.max_attempts = max_attempts;
        }
        if args.lenient_categories() {
            settings.strict_categories = false;
        }
        let credential = match mode {
            Mode::Live => Credential::from_env(),
            Mode::Test => None,
        };
        Self::new(
            args.input(),
            args.output(),
            args.cache(),
            settings,
            mode,
            credential,
        )
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

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.batch_size, 30);
        assert_eq!(s.max_attempts, 5);
        assert_eq!(s.model, "gpt-5-mini");
        assert_eq!(s.retry_policy(), RetryPolicy::default());
        assert_eq!(s.categories().unwrap(), Categories::default());
    }

    #[test]
    fn test_partial_settings_file_merges_with_defaults() {
        let json = r#"{"batch_size": 10, "strict_categories": false}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.batch_size, 10);
        assert!(!s.strict_categories);
        assert_eq!(s.max_attempts, 5);
        assert_eq!(s.fallback_category, "Misc");
    }

    #[test]
    fn test_unknown_settings_field_rejected() {
        assert!(serde_json::from_str::<Settings>(r#"{"batchsize": 10}"#).is_err());
    }

    #[test]
    fn test_validation() {
        let mut s = Settings::default();
        s.batch_size = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.max_attempts = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.fallback_category = "Other".to_string();
        assert!(s.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"model": "gpt-4o-mini", "max_attempts": 3}"#).unwrap();
        let s = Settings::load_or_default(Some(&path)).await.unwrap();
        assert_eq!(s.model, "gpt-4o-mini");
        assert_eq!(s.max_attempts, 3);
        assert_eq!(Settings::load_or_default(None).await.unwrap(), Settings::default());
    }

    #[test]
    fn test_live_mode_requires_credential() {
        let err = Config::new("in.csv", "out.csv", "c.json", Settings::default(), Mode::Live, None)
            .unwrap_err();
        assert!(err.to_string().contains("API key not found"));

        let config = Config::new(
            "in.csv",
            "out.csv",
            "c.json",
            Settings::default(),
            Mode::Live,
            Some(Credential::new("sk-123".to_string())),
        )
        .unwrap();
        assert_eq!(config.credential().unwrap().secret(), "sk-123");
        assert!(Config::new("i", "o", "c", Settings::default(), Mode::Test, None).is_ok());
    }

    #[tokio::test]
    async fn test_flags_override_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"model": "from-file", "batch_size": 12}"#).unwrap();
        let args = crate::args::Args::try_parse_from([
            "txclass",
            "classify",
            "--config",
            path.to_str().unwrap(),
            "--batch-size",
            "4",
            "--lenient-categories",
        ])
        .unwrap();
        let crate::args::Command::Classify(classify) = args.command() else {
            panic!("expected classify");
        };
        let config = Config::load(classify, Mode::Test).await.unwrap();
        assert_eq!(config.settings().model, "from-file");
        assert_eq!(config.settings().batch_size, 4);
        assert!(!config.settings().strict_categories);
        assert!(config.credential().is_none());
    }

    #[tokio::test]
    async fn test_invalid_flag_values_are_rejected() {
        let mut args = ClassifyArgs::new("in.csv", "out.csv", "cache.json");
        assert!(Config::load(&args, Mode::Test).await.is_ok());
        args = crate::args::Args::try_parse_from(["txclass", "classify", "--batch-size", "0"])
            .map(|a| match a.command() {
                crate::args::Command::Classify(c) => c.clone(),
                _ => panic!("expected classify"),
            })
            .unwrap();
        let err = Config::load(&args, Mode::Test).await.unwrap_err();
        assert!(format!("{err:#}").contains("batch_size"));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let c = Credential::new("sk-secret".to_string());
        assert!(!format!("{c:?}").contains("sk-secret"));
    }
}
