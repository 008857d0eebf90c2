//! Text-completion provider abstraction.
//!
//! The relevance layer only needs "prompt in, completion text out"; everything
//! provider-specific (auth, wire format, timeouts) stays behind `CompletionClient`.

pub mod mock;
pub mod openai;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use mock::MockCompletion;
pub use openai::OpenAiClient;

/// One system + user exchange with sampling bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("provider returned an empty completion")]
    EmptyCompletion,
    #[error("reply does not follow the expected format: {0}")]
    MalformedReply(String),
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;

pub trait CompletionClient: Send + Sync {
    /// Run one completion. Timeouts are enforced by the implementation.
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> CompletionFuture<'a>;
    /// Provider label for logs and placeholder reasons.
    fn provider_name(&self) -> &'static str;
}

pub type DynCompletionClient = Arc<dyn CompletionClient>;
