//! OpenAI Chat Completions client (or any endpoint speaking the same JSON).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionClient, CompletionFuture, CompletionRequest, LlmError};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
// Error bodies can be large HTML pages; keep only the head in the error.
const ERROR_BODY_MAX: usize = 300;

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiClient {
    /// `timeout` bounds the whole request (connect + response body).
    pub fn new(
        api_key: impl Into<String>,
        endpoint: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("normativa-relevance/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
        })
    }

    async fn complete_impl(&self, req: &CompletionRequest) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let body = Req {
            model: &req.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &req.system,
                },
                Msg {
                    role: "user",
                    content: &req.prompt,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let head: String = text.chars().take(ERROR_BODY_MAX).collect();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: head,
            });
        }

        let parsed: Resp = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Decode(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        debug!(target: "relevance", chars = content.chars().count(), "completion received");
        Ok(content)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Transport(e.to_string())
    }
}

impl CompletionClient for OpenAiClient {
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(self.complete_impl(req))
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        let err = OpenAiClient::new("  ", None, Duration::from_secs(5))
            .err()
            .expect("must fail");
        assert_eq!(err, LlmError::MissingApiKey);
    }

    #[test]
    fn default_endpoint_is_openai() {
        let c = OpenAiClient::new("sk-test", None, Duration::from_secs(5)).unwrap();
        assert_eq!(c.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(c.provider_name(), "OpenAI");
    }
}
