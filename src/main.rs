//! Relevance CLI: binary entrypoint.
//! Reads one document per stdin line and prints one JSON verdict per line.
//!
//! Input line: `TITLE` or `TITLE<TAB>EXCERPT`.
//! With `--cmf`, each line is a JSON material event (`{"title","subject","entity"}`)
//! and the selected filings are printed instead.

use std::io::{self, BufRead, Write};

use normativa_relevance::cmf::{self, MaterialEvent, DEFAULT_MAX_EVENTS};
use normativa_relevance::metrics::Metrics;
use normativa_relevance::{RelevanceConfig, RelevanceService};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs to stderr by default; JSON when RELEVANCE_LOG_JSON=1.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relevance=info,warn"));

    let json = std::env::var("RELEVANCE_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(io::stderr))
            .init();
    }
}

fn split_line(line: &str) -> (&str, Option<&str>) {
    match line.split_once('\t') {
        Some((title, excerpt)) if !excerpt.trim().is_empty() => (title.trim(), Some(excerpt)),
        Some((title, _)) => (title.trim(), None),
        None => (line.trim(), None),
    }
}

async fn run_relevance(cfg: &RelevanceConfig) -> anyhow::Result<()> {
    let svc = RelevanceService::from_config(cfg)?;
    let purged = svc.purge_expired().await;
    if purged > 0 {
        info!(target: "relevance", purged, "expired cache entries removed");
    }

    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (title, excerpt) = split_line(&line);
        let result = svc.evaluate(title, excerpt).await;
        let row = json!({
            "title": title,
            "is_relevant": result.is_relevant,
            "reason": result.reason,
        });
        writeln!(out, "{row}")?;
    }

    let stats = svc.stats();
    info!(
        target: "relevance",
        backend = stats.backend,
        hits = stats.hits,
        misses = stats.misses,
        errors = stats.errors,
        "run finished"
    );
    Ok(())
}

fn run_cmf() -> anyhow::Result<()> {
    let mut events = Vec::new();
    for (n, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MaterialEvent>(&line) {
            Ok(ev) => events.push(ev),
            Err(e) => warn!(target: "relevance", line = n + 1, error = %e, "skipping malformed event"),
        }
    }

    let mut out = io::stdout().lock();
    for scored in cmf::filter_material_events(events, DEFAULT_MAX_EVENTS) {
        let a = scored.assessment;
        let row = json!({
            "entity": scored.event.entity,
            "title": scored.event.title,
            "category": a.category,
            "icon": a.category.icon(),
            "score": a.score,
            "ipsa": a.is_ipsa,
            "institutional_interest": cmf::institutional_interest(&a),
        });
        writeln!(out, "{row}")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env when present; OPENAI_API_KEY usually lives there.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelevanceConfig::load()?;

    let print_metrics = std::env::var("RELEVANCE_PRINT_METRICS")
        .ok()
        .is_some_and(|v| v == "1");
    let metrics = if print_metrics {
        Some(Metrics::init(cfg.cache.ttl_days)?)
    } else {
        None
    };

    if std::env::args().skip(1).any(|a| a == "--cmf") {
        run_cmf()?;
    } else {
        run_relevance(&cfg).await?;
    }

    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }
    Ok(())
}
