// src/relevance/mod.rs
//! Relevance gate for digest documents: request/result types, the rule engine,
//! the LLM-assisted classifier and the caching service that ties them together.

pub mod llm;
pub mod rules;
pub mod service;

use serde::{Deserialize, Serialize};

pub use llm::LlmClassifier;
pub use rules::{classify_by_rules, RuleTable};
pub use service::RelevanceService;

/// One document examined during report generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    pub title: String,
    /// Leading text of the source document (PDF/HTML), when it could be extracted.
    pub body_excerpt: Option<String>,
}

impl ClassificationRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body_excerpt: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.body_excerpt = Some(excerpt.into());
        self
    }
}

/// Inclusion decision plus a one-line justification for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_relevant: bool,
    pub reason: String,
}

impl ClassificationResult {
    pub fn relevant(reason: impl Into<String>) -> Self {
        Self {
            is_relevant: true,
            reason: reason.into(),
        }
    }

    pub fn not_relevant(reason: impl Into<String>) -> Self {
        Self {
            is_relevant: false,
            reason: reason.into(),
        }
    }
}

/// Short, stable identifier for a title so logs never carry raw document text.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// First `max` characters of `s` (not bytes, so accented text never splits).
pub(crate) fn take_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
