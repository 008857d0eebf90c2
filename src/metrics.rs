use anyhow::Context;
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish the cache TTL gauge.
    /// Fails if another recorder is already installed in this process.
    pub fn init(ttl_days: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        gauge!("relevance_cache_ttl_days").set(ttl_days as f64);

        Ok(Self { handle })
    }

    /// Current values in the Prometheus exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
