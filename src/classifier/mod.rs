//! The classifier client: turns a batch of transactions into a request, sends it through a
//! `CompletionService`, parses the answer, and retries transient failures with exponential backoff.

mod parse;
mod prompt;

use crate::api::{CompletionService, RequestRow, ServiceRequest};
use crate::error::ClassifyError;
use crate::model::{Categories, Transaction};
use std::time::Duration;
use tracing::{debug, trace, warn};

pub use parse::{parse_response, ServiceItem};

/// How many times to try a batch and how long to wait in between.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The wait after failed attempt `attempt` (zero-based): `base_delay * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Where the retry loop is.
enum Step {
    /// Make attempt number `n` (zero-based).
    Attempt(u32),
    /// Attempt `n` failed with `error`; wait, then move on.
    Backoff(u32, ClassifyError),
}

/// Classifies batches of transactions against a `CompletionService`.
pub struct ClassifierClient {
    service: Box<dyn CompletionService + Send>,
    model: String,
    instructions: String,
    policy: RetryPolicy,
}

impl ClassifierClient {
    pub fn new(
        service: Box<dyn CompletionService + Send>,
        model: impl Into<String>,
        categories: &Categories,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            model: model.into(),
            instructions: prompt::instructions(categories),
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Classifies `batch`, retrying network errors, error statuses and unparseable answers. Returns
    /// whatever items the service produced; it is up to the caller to notice rows that are missing.
    ///
    /// # Errors
    /// `ClassifyError::Exhausted` wrapping the last failure once every attempt has failed.
    pub async fn classify(
        &mut self,
        batch: &[Transaction],
    ) -> Result<Vec<ServiceItem>, ClassifyError> {
        let request = ServiceRequest {
            model: self.model.clone(),
            instructions: self.instructions.clone(),
            rows: batch.iter().map(RequestRow::from).collect(),
        };

        let max = self.policy.max_attempts();
        let mut step = Step::Attempt(0);
        loop {
            step = match step {
                Step::Attempt(n) => match self.attempt(&request).await {
                    Ok(items) => {
                        debug!(
                            "Attempt {} returned {} items for {} rows",
                            n + 1,
                            items.len(),
                            request.rows.len()
                        );
                        return Ok(items);
                    }
                    Err(e) if n + 1 >= max => {
                        return Err(ClassifyError::Exhausted {
                            attempts: n + 1,
                            source: Box::new(e),
                        })
                    }
                    Err(e) => Step::Backoff(n, e),
                },
                Step::Backoff(n, e) => {
                    let delay = self.policy.delay(n);
                    warn!(
                        "Classification attempt {}/{max} failed, retrying in {delay:?}: {e}",
                        n + 1
                    );
                    tokio::time::sleep(delay).await;
                    Step::Attempt(n + 1)
                }
            };
        }
    }

    async fn attempt(
        &mut self,
        request: &ServiceRequest,
    ) -> Result<Vec<ServiceItem>, ClassifyError> {
        let text = self.service.complete(request).await?;
        trace!("Classification response: {text}");
        parse_response(&text)
    }
}
