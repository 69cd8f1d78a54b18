//! Synchronous command surface for front ends
//!
//! Every method blocks on one round driven by a private current-thread
//! runtime. The most recent interactive ping round is kept as a session and
//! merged into cached balances until the cache or the session is cleared.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};

use crate::config::MonitorConfig;
use crate::monitor::{
    compute_stats, merge_ping_into_cached, ping_services_match, AggregatedRecord, BalanceMonitor,
    MonitorError, StatsSummary,
};
use crate::providers::{PingResult, PingStatus};

pub const CONFIGURATION_HINT: &str =
    "Make sure you have configured your API keys in the environment or .env file";

/// Error shown in place of the balance view
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct ErrorBanner {
    pub message: String,
    pub hint: String,
}

impl ErrorBanner {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: CONFIGURATION_HINT.to_string(),
        }
    }
}

impl From<MonitorError> for ErrorBanner {
    fn from(err: MonitorError) -> Self {
        ErrorBanner::new(format!("Error fetching balance information: {}", err))
    }
}

/// Stored results of the last interactive ping round
#[derive(Debug, Clone, PartialEq)]
pub struct PingSession {
    pub results: Vec<PingResult>,
    pub tested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReport {
    pub results: Vec<PingResult>,
    /// Wall clock for the whole round
    pub total_seconds: f64,
    /// Pings actually sent; unconfigured slots are skipped
    pub tested: usize,
    pub tested_at: DateTime<Utc>,
}

pub struct MonitorHandle {
    runtime: Runtime,
    monitor: BalanceMonitor,
    ping_session: Mutex<Option<PingSession>>,
}

impl MonitorHandle {
    pub fn new(monitor: BalanceMonitor) -> Result<Self, ErrorBanner> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ErrorBanner::from(MonitorError::Runtime(err)))?;

        let credentials = monitor.credentials();
        tracing::info!(
            "Monitoring {} credential slots, {} configured",
            credentials.len(),
            credentials.iter().filter(|c| c.is_configured()).count()
        );

        Ok(Self {
            runtime,
            monitor,
            ping_session: Mutex::new(None),
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ErrorBanner> {
        Self::new(BalanceMonitor::new(config))
    }

    fn session(&self) -> MutexGuard<'_, Option<PingSession>> {
        self.ping_session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached balance view with the current ping session merged in.
    /// A session whose services no longer match the records is dropped.
    pub fn get_cached_balances(&self, include_ping_tests: bool) -> Result<Vec<AggregatedRecord>, ErrorBanner> {
        let records = self
            .runtime
            .block_on(self.monitor.cached_balances(include_ping_tests))?;

        let mut session = self.session();
        match session.as_ref() {
            Some(current) if ping_services_match(&records, &current.results) => {
                Ok(merge_ping_into_cached(&records, &current.results))
            }
            Some(_) => {
                tracing::warn!("Discarding ping session for a different set of services");
                *session = None;
                Ok(records.as_ref().clone())
            }
            None => Ok(records.as_ref().clone()),
        }
    }

    /// Ping every slot now and keep the results as the session
    pub fn ping_all_apis(&self) -> Result<PingReport, ErrorBanner> {
        let started = Instant::now();
        let results = self.runtime.block_on(self.monitor.ping_all())?;
        let total_seconds = started.elapsed().as_secs_f64();

        let tested = results
            .iter()
            .filter(|ping| ping.status != PingStatus::NotConfigured)
            .count();
        let tested_at = Utc::now();

        *self.session() = Some(PingSession {
            results: results.clone(),
            tested_at,
        });

        tracing::info!("Ping test finished: {} of {} services tested", tested, results.len());
        Ok(PingReport {
            results,
            total_seconds,
            tested,
            tested_at,
        })
    }

    pub fn compute_stats(&self, records: &[AggregatedRecord]) -> StatsSummary {
        compute_stats(records)
    }

    pub fn invalidate_cache(&self) {
        self.runtime.block_on(self.monitor.invalidate_cache());
    }

    /// Drop both the cached view and the ping session
    pub fn refresh_all(&self) {
        self.invalidate_cache();
        self.clear_ping();
    }

    pub fn clear_ping(&self) {
        *self.session() = None;
    }

    pub fn ping_session(&self) -> Option<PingSession> {
        self.session().clone()
    }
}
