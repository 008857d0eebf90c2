// src/relevance/service.rs
//! Cache-fronted relevance evaluation used by report generation.
//!
//! `evaluate` = key → cache lookup → (LLM | rules) → cache write. The cache is
//! injected; its failures count as misses and never reach the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::llm::LlmClassifier;
use super::rules::RuleTable;
use super::{anon_hash, ClassificationRequest, ClassificationResult};
use crate::cache::{
    evaluation_key, get_typed, put_typed, summary_key, CacheError, CacheStore, FileCache,
    MemoryCache, DEFAULT_TTL,
};
use crate::config::{CacheBackend, RelevanceConfig};
use crate::llm::{DynCompletionClient, OpenAiClient};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relevance_cache_hits_total", "Evaluations served from cache.");
        describe_counter!("relevance_cache_misses_total", "Evaluations not found in cache.");
        describe_counter!(
            "relevance_cache_errors_total",
            "Cache reads/writes that failed and were treated as misses."
        );
        describe_counter!(
            "relevance_classifications_total",
            "Classifier runs by path (llm|rules)."
        );
        describe_counter!("relevance_llm_requests_total", "LLM classification attempts.");
        describe_counter!(
            "relevance_llm_fallbacks_total",
            "LLM attempts answered by the rule table instead."
        );
    });
}

/// Monitoring snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub backend: &'static str,
    pub ttl_days: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

pub struct RelevanceService {
    cache: Arc<dyn CacheStore>,
    rules: Arc<RuleTable>,
    llm: Option<LlmClassifier>,
    ttl: Duration,
    counters: Counters,
}

pub struct RelevanceServiceBuilder {
    cache: Arc<dyn CacheStore>,
    rules: Arc<RuleTable>,
    llm: Option<(DynCompletionClient, String)>,
    sampling: Option<(f32, u32)>,
    ttl: Duration,
}

impl RelevanceServiceBuilder {
    pub fn rules(mut self, rules: RuleTable) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// Enables the LLM path. Without it every miss goes to the rule table.
    pub fn llm(mut self, client: DynCompletionClient, model: impl Into<String>) -> Self {
        self.llm = Some((client, model.into()));
        self
    }

    pub fn sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.sampling = Some((temperature, max_tokens));
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> RelevanceService {
        ensure_metrics_described();
        let rules = self.rules;
        let sampling = self.sampling;
        let llm = self.llm.map(|(client, model)| {
            let c = LlmClassifier::new(client, model, rules.clone());
            match sampling {
                Some((t, m)) => c.with_sampling(t, m),
                None => c,
            }
        });
        RelevanceService {
            cache: self.cache,
            rules,
            llm,
            ttl: self.ttl,
            counters: Counters::default(),
        }
    }
}

impl RelevanceService {
    pub fn builder(cache: Arc<dyn CacheStore>) -> RelevanceServiceBuilder {
        RelevanceServiceBuilder {
            cache,
            rules: Arc::new(RuleTable::builtin()),
            llm: None,
            sampling: None,
            ttl: DEFAULT_TTL,
        }
    }

    /// Wire cache backend, rule table and (credential permitting) the OpenAI client.
    pub fn from_config(cfg: &RelevanceConfig) -> anyhow::Result<Self> {
        let cache: Arc<dyn CacheStore> = match cfg.cache.backend {
            CacheBackend::Memory => match cfg.cache.max_entries {
                Some(n) => Arc::new(MemoryCache::with_max_entries(n)),
                None => Arc::new(MemoryCache::new()),
            },
            CacheBackend::File => Arc::new(FileCache::new(&cfg.cache.dir)),
        };

        let mut builder = Self::builder(cache)
            .ttl(cfg.cache_ttl())
            .sampling(cfg.llm.temperature, cfg.llm.max_tokens);

        if let Some(path) = &cfg.rules.path {
            builder = builder.rules(RuleTable::from_path(path)?);
        }

        if let Some(key) = cfg.resolve_api_key() {
            let client = OpenAiClient::new(key, cfg.llm.endpoint.as_deref(), cfg.llm_timeout())?;
            builder = builder.llm(Arc::new(client), cfg.llm.model.clone());
        }

        let svc = builder.build();
        info!(
            target: "relevance",
            backend = svc.cache.backend_name(),
            ttl_days = cfg.cache.ttl_days,
            llm = svc.uses_llm(),
            "relevance service ready"
        );
        Ok(svc)
    }

    pub fn uses_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Relevance of one document. Always returns a result.
    pub async fn evaluate(&self, title: &str, body_excerpt: Option<&str>) -> ClassificationResult {
        if title.trim().is_empty() {
            return self.rules.classify(title);
        }

        let key = evaluation_key(title, body_excerpt);
        let id = anon_hash(title);

        match get_typed::<ClassificationResult>(self.cache.as_ref(), &key).await {
            Ok(Some(hit)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                counter!("relevance_cache_hits_total").increment(1);
                debug!(target: "relevance", %id, "evaluation served from cache");
                return hit;
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                counter!("relevance_cache_misses_total").increment(1);
            }
            Err(e) => self.cache_failed(&id, "read", &e),
        }

        let result = self.classify_uncached(title, body_excerpt).await;

        match put_typed(self.cache.as_ref(), &key, &result, self.ttl).await {
            Ok(()) => debug!(target: "relevance", %id, "evaluation cached"),
            Err(e) => self.cache_failed(&id, "write", &e),
        }
        result
    }

    pub async fn evaluate_request(&self, req: &ClassificationRequest) -> ClassificationResult {
        self.evaluate(&req.title, req.body_excerpt.as_deref()).await
    }

    async fn classify_uncached(&self, title: &str, body_excerpt: Option<&str>) -> ClassificationResult {
        match &self.llm {
            Some(llm) => {
                counter!("relevance_classifications_total", "path" => "llm").increment(1);
                llm.classify(title, body_excerpt).await
            }
            None => {
                counter!("relevance_classifications_total", "path" => "rules").increment(1);
                self.rules.classify(title)
            }
        }
    }

    fn cache_failed(&self, id: &str, op: &'static str, e: &CacheError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        counter!("relevance_cache_errors_total", "op" => op).increment(1);
        warn!(target: "relevance", %id, op, error = %e, "cache unavailable; continuing without it");
    }

    /// Previously generated summary for a filing, if still cached.
    pub async fn cached_summary(
        &self,
        entity: &str,
        subject: &str,
        body_excerpt: Option<&str>,
    ) -> Option<String> {
        let key = summary_key(entity, subject, body_excerpt);
        match get_typed::<String>(self.cache.as_ref(), &key).await {
            Ok(hit) => hit,
            Err(e) => {
                self.cache_failed(&anon_hash(&key), "read", &e);
                None
            }
        }
    }

    pub async fn cache_summary(
        &self,
        entity: &str,
        subject: &str,
        body_excerpt: Option<&str>,
        summary: &str,
    ) {
        let key = summary_key(entity, subject, body_excerpt);
        if let Err(e) = put_typed(self.cache.as_ref(), &key, &summary, self.ttl).await {
            self.cache_failed(&anon_hash(&key), "write", &e);
        }
    }

    pub async fn purge_expired(&self) -> usize {
        match self.cache.purge_expired().await {
            Ok(n) => n,
            Err(e) => {
                self.cache_failed("-", "purge", &e);
                0
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            backend: self.cache.backend_name(),
            ttl_days: self.ttl.as_secs() / 86_400,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}
