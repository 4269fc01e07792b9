//! Implements `CompletionService` against the OpenAI Responses API.

use crate::api::{CompletionService, ServiceRequest};
use crate::config::Credential;
use crate::error::ClassifyError;
use serde::{Deserialize, Serialize};
use tracing::trace;

pub(crate) struct OpenAiService {
    client: reqwest::Client,
    endpoint: String,
    credential: Credential,
}

impl OpenAiService {
    pub(crate) fn new(base_url: &str, credential: Credential) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/v1/responses", base_url.trim_end_matches('/')),
            credential,
        }
    }
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    input: Vec<Msg<'a>>,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    t: String,
    text: Option<String>,
}

impl Resp {
    /// The text the model produced, joined across output blocks.
    fn text(self) -> String {
        if let Some(text) = self.output_text {
            return text;
        }
        let mut s = String::new();
        for block in self.output.into_iter().flat_map(|o| o.content) {
            if block.t == "output_text" {
                if let Some(t) = block.text {
                    s.push_str(&t);
                }
            }
        }
        s
    }
}

#[async_trait::async_trait]
impl CompletionService for OpenAiService {
    async fn complete(&mut self, request: &ServiceRequest) -> Result<String, ClassifyError> {
        let payload = request
            .payload()
            .map_err(|e| ClassifyError::parse(format!("{e:#}")))?;
        let body = Req {
            model: &request.model,
            input: vec![
                Msg {
                    role: "developer",
                    content: &request.instructions,
                },
                Msg {
                    role: "user",
                    content: &payload,
                },
            ],
        };
        trace!(
            "POST {} with {} rows for model {}",
            self.endpoint,
            request.rows.len(),
            request.model
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.credential.secret())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ClassifyError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let out: Resp = resp.json().await?;
        Ok(out.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_from_output_blocks() {
        let json = r#"{
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"items\": "},
                    {"type": "output_text", "text": "[]}"}
                ]}
            ]
        }"#;
        let resp: Resp = serde_json::from_str(json).unwrap();
        assert_eq!(resp.text(), "{\"items\": []}");
    }

    #[test]
    fn test_response_text_prefers_output_text() {
        let resp: Resp = serde_json::from_str(r#"{"output_text": "{}"}"#).unwrap();
        assert_eq!(resp.text(), "{}");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let service = OpenAiService::new(
            "https://api.openai.com/",
            Credential::new("sk-test".to_string()),
        );
        assert_eq!(service.endpoint, "https://api.openai.com/v1/responses");
    }
}
