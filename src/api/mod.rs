//! The seam between the pipeline and the external classification service.
//!
//! A `CompletionService` takes one fully-formed request and returns the raw text the service
//! produced, or a typed failure. Prompt construction, response parsing and retries live above it in
//! `crate::classifier`.

mod openai;
mod test_service;

use crate::config::Credential;
use crate::error::ClassifyError;
use crate::model::Transaction;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub(crate) use openai::OpenAiService;
pub use test_service::{Fallthrough, Reply, TestService, TestServiceState};

/// The environment variable that switches the program to the offline `TestService`.
pub const TEST_MODE_ENV: &str = "TXCLASS_IN_TEST_MODE";

/// Whether to talk to the real classification service or the in-process test double.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Live,
    Test,
}

serde_plain::derive_display_from_serialize!(Mode);
serde_plain::derive_fromstr_from_deserialize!(Mode);

impl Mode {
    /// `Mode::Test` when `TXCLASS_IN_TEST_MODE` is set and non-empty, otherwise `Mode::Live`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Live,
        }
    }
}

/// One row as the service sees it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestRow {
    pub row_id: usize,
    pub description: String,
    pub amount: String,
}

impl From<&Transaction> for RequestRow {
    fn from(t: &Transaction) -> Self {
        Self {
            row_id: t.row_id(),
            description: t.description().to_string(),
            amount: t.amount().to_string(),
        }
    }
}

/// A complete request for one batch: which model, what to do, and the rows to do it to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub model: String,
    pub instructions: String,
    pub rows: Vec<RequestRow>,
}

impl ServiceRequest {
    /// The rows as the JSON document sent in the user message: `{"rows": [...]}`.
    pub fn payload(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Payload<'a> {
            rows: &'a [RequestRow],
        }
        serde_json::to_string(&Payload { rows: &self.rows })
            .context("Unable to serialize the classification payload")
    }
}

/// Sends a single classification request and returns the service's raw text answer.
#[async_trait::async_trait]
pub trait CompletionService {
    async fn complete(
        &mut self,
        request: &ServiceRequest,
    ) -> std::result::Result<String, ClassifyError>;
}

/// Creates the service for `mode`. Live mode requires a credential.
pub fn service(
    mode: Mode,
    base_url: &str,
    credential: Option<&Credential>,
) -> Result<Box<dyn CompletionService + Send>> {
    debug!("Creating the classification service in {mode} mode");
    match mode {
        Mode::Live => {
            let credential = credential
                .context("A credential is required to use the live classification service")?;
            Ok(Box::new(OpenAiService::new(base_url, credential.clone())))
        }
        Mode::Test => Ok(Box::new(TestService::default())),
    }
}
