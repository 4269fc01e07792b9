//! Implements the `CompletionService` trait in memory for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without calling the real classification service.

use crate::api::{CompletionService, ServiceRequest};
use crate::error::ClassifyError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// What the `TestService` does once its script is used up.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallthrough {
    /// Answer every row with this category and confidence.
    Echo { category: String, confidence: f64 },
    /// Fail every call with a service error.
    Fail,
}

impl Default for Fallthrough {
    fn default() -> Self {
        Fallthrough::Echo {
            category: "Misc".to_string(),
            confidence: 0.5,
        }
    }
}

/// A scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Fail(String),
}

/// The observable state of a `TestService`: the requests it received and the replies it has left.
#[derive(Debug, Clone, Default)]
pub struct TestServiceState {
    pub requests: Vec<ServiceRequest>,
    pub script: VecDeque<Reply>,
    pub fallthrough: Fallthrough,
}

/// An implementation of `CompletionService` that never leaves the process. Replies come from a
/// script, then from the `Fallthrough` behavior. Clones share state, so a test can keep a handle
/// after giving the service away and inspect how many calls were made.
#[derive(Debug, Clone, Default)]
pub struct TestService {
    state: Arc<Mutex<TestServiceState>>,
}

impl TestService {
    pub fn new(fallthrough: Fallthrough) -> Self {
        let service = Self::default();
        service.state().fallthrough = fallthrough;
        service
    }

    /// Queue a raw text reply.
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.state().script.push_back(Reply::Text(text.into()));
        self
    }

    /// Queue a failure.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.state().script.push_back(Reply::Fail(message.into()));
        self
    }

    /// The number of requests received so far.
    pub fn calls(&self) -> usize {
        self.state().requests.len()
    }

    /// A snapshot of the current state.
    pub fn get_state(&self) -> TestServiceState {
        self.state().clone()
    }

    fn state(&self) -> MutexGuard<'_, TestServiceState> {
        // A panic while holding the lock only happens inside a failing test.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl CompletionService for TestService {
    async fn complete(&mut self, request: &ServiceRequest) -> Result<String, ClassifyError> {
        let mut state = self.state();
        state.requests.push(request.clone());
        let reply = match state.script.pop_front() {
            Some(reply) => reply,
            None => match &state.fallthrough {
                Fallthrough::Echo {
                    category,
                    confidence,
                } => Reply::Text(echo(request, category, *confidence)),
                Fallthrough::Fail => Reply::Fail("test service is failing".to_string()),
            },
        };
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(body) => Err(ClassifyError::Service { status: 503, body }),
        }
    }
}

fn echo(request: &ServiceRequest, category: &str, confidence: f64) -> String {
    let items: Vec<serde_json::Value> = request
        .rows
        .iter()
        .map(|row| {
            serde_json::json!({
                "row_id": row.row_id,
                "category": category,
                "confidence": confidence,
            })
        })
        .collect();
    serde_json::json!({ "items": items }).to_string()
}
