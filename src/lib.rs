// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod cache;
pub mod cmf;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod relevance;

// ---- Re-exports for stable public API ----
pub use crate::cache::{CacheStore, FileCache, MemoryCache};
pub use crate::config::RelevanceConfig;
pub use crate::relevance::{
    classify_by_rules, ClassificationRequest, ClassificationResult, LlmClassifier,
    RelevanceService, RuleTable,
};
