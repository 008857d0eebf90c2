//! Deterministic cache keys.
//!
//! Same inputs, same key, across processes and restarts: SHA-256 over
//! `"{title}:{first 500 chars of excerpt}"` (empty excerpt when absent),
//! prefixed with a namespace.

use sha2::{Digest, Sha256};

use crate::relevance::take_chars;

/// Characters of the excerpt that take part in the key.
pub const KEY_EXCERPT_CHARS: usize = 500;

pub const EVALUATION_NAMESPACE: &str = "eval";
pub const SUMMARY_NAMESPACE: &str = "summary";

/// Key for a relevance evaluation of (title, excerpt).
pub fn evaluation_key(title: &str, body_excerpt: Option<&str>) -> String {
    let excerpt = take_chars(body_excerpt.unwrap_or(""), KEY_EXCERPT_CHARS);
    namespaced(EVALUATION_NAMESPACE, &format!("{title}:{excerpt}"))
}

/// Key for a generated summary of a filing by `entity` about `subject`.
pub fn summary_key(entity: &str, subject: &str, body_excerpt: Option<&str>) -> String {
    let excerpt = take_chars(body_excerpt.unwrap_or(""), KEY_EXCERPT_CHARS);
    namespaced(SUMMARY_NAMESPACE, &format!("{entity}:{subject}:{excerpt}"))
}

fn namespaced(ns: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{ns}:{:x}", hasher.finalize())
}
