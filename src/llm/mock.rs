//! Deterministic completion client for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CompletionClient, CompletionFuture, CompletionRequest, LlmError};

/// Returns the same outcome on every call and counts how often it was asked.
pub struct MockCompletion {
    outcome: Result<String, LlmError>,
    calls: Arc<AtomicUsize>,
}

impl MockCompletion {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            outcome: Ok(reply.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(err: LlmError) -> Self {
        Self {
            outcome: Err(err),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter; stays valid after the client is moved into a service.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionClient for MockCompletion {
    fn complete<'a>(&'a self, _req: &'a CompletionRequest) -> CompletionFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = self.outcome.clone();
        Box::pin(async move { out })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
