//! Balance monitor: aggregation, formatting, caching and statistics

mod aggregator;
mod cache;
mod format;
mod stats;

pub use aggregator::Aggregator;
pub use cache::{TtlCache, DEFAULT_TTL};
pub use format::{
    format_record, merge_ping_into_cached, ping_display, ping_services_match, status_display,
    status_emoji, AggregatedRecord, DisplayRecord, RecordInternals,
};
pub use stats::{compute_stats, BalanceStats, FamilyStats, OverallStats, StatsSummary};

use std::sync::Arc;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::providers::{Credential, PingResult, ProviderRegistry};

#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    #[error("aggregation round aborted: {0}")]
    RoundAborted(String),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Owns the configured credential slots, the aggregator and the cache.
///
/// Construct once per process and hand it to the consumer boundary.
pub struct BalanceMonitor {
    credentials: Arc<Vec<Credential>>,
    aggregator: Arc<Aggregator>,
    cache: TtlCache<bool, Vec<AggregatedRecord>>,
}

impl BalanceMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self::with_registry(
            config.credentials.clone(),
            ProviderRegistry::new(&config.providers),
            config.cache_ttl,
        )
    }

    pub fn with_registry(credentials: Vec<Credential>, registry: ProviderRegistry, cache_ttl: Duration) -> Self {
        Self {
            credentials: Arc::new(credentials),
            aggregator: Arc::new(Aggregator::new(registry)),
            cache: TtlCache::new(cache_ttl),
        }
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Cached balance view, refreshed when missing or older than the TTL
    pub async fn cached_balances(&self, include_ping: bool) -> Result<Arc<Vec<AggregatedRecord>>, MonitorError> {
        let aggregator = self.aggregator.clone();
        let credentials = self.credentials.clone();

        self.cache
            .get_or_refresh(include_ping, || async move {
                tokio::spawn(async move { aggregator.aggregate_balances(&credentials, include_ping).await })
                    .await
                    .map_err(|err| MonitorError::RoundAborted(err.to_string()))
            })
            .await
    }

    /// Ping round over every slot, independent of the cached view
    pub async fn ping_all(&self) -> Result<Vec<PingResult>, MonitorError> {
        let aggregator = self.aggregator.clone();
        let credentials = self.credentials.clone();

        tokio::spawn(async move { aggregator.ping_all(&credentials).await })
            .await
            .map_err(|err| MonitorError::RoundAborted(err.to_string()))
    }

    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }
}
