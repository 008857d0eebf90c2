pub mod relevance;

pub use relevance::{CacheBackend, CacheSection, LlmSection, RelevanceConfig, RulesSection};
