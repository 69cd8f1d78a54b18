//! Concurrent probe and ping rounds over the configured credential slots

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use super::format::{format_record, AggregatedRecord};
use crate::providers::{Credential, PingResult, PingStatus, ProbeResult, ProviderRegistry};

/// Fans out one task per credential and reassembles results in slot order
pub struct Aggregator {
    registry: Arc<ProviderRegistry>,
}

impl Aggregator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Probe every slot concurrently. A task that panics yields an `error`
    /// record for its slot; siblings are unaffected.
    pub async fn probe_all(&self, credentials: &[Credential]) -> Vec<ProbeResult> {
        let started = Instant::now();

        let handles: Vec<JoinHandle<ProbeResult>> = credentials
            .iter()
            .cloned()
            .map(|credential| {
                let probe = self.registry.balance_probe(credential.family());
                tokio::spawn(async move {
                    match probe {
                        Some(probe) => {
                            tracing::debug!("Probing {} with the {} adapter", credential.name(), probe.name());
                            probe.probe(&credential).await
                        }
                        None => ProbeResult::error(
                            &credential,
                            format!("No balance adapter registered for {}", credential.family()),
                        ),
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (credential, handle) in credentials.iter().zip(handles) {
            let mut result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!("Balance task for {} aborted: {}", credential.name(), err);
                    ProbeResult::error(credential, format!("Probe task failed: {}", err))
                }
            };
            // Slot identity is the display name; merges rely on it.
            result.service = credential.name().to_string();
            results.push(result);
        }

        tracing::info!(
            "Balance round finished: {} probes in {}ms",
            results.len(),
            started.elapsed().as_millis()
        );
        results
    }

    /// Ping every slot concurrently, no balance probes
    pub async fn ping_all(&self, credentials: &[Credential]) -> Vec<PingResult> {
        let started = Instant::now();

        let handles: Vec<JoinHandle<PingResult>> = credentials
            .iter()
            .cloned()
            .map(|credential| {
                let probe = self.registry.ping_probe(credential.family());
                tokio::spawn(async move {
                    match probe {
                        Some(probe) => {
                            tracing::debug!("Pinging {} via {}", credential.name(), probe.model());
                            probe.ping(&credential).await
                        }
                        None => PingResult::failure(
                            &credential,
                            PingStatus::Failed,
                            0.0,
                            format!("No ping adapter registered for {}", credential.family()),
                        ),
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (credential, handle) in credentials.iter().zip(handles) {
            let mut result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::warn!("Ping task for {} aborted: {}", credential.name(), err);
                    PingResult::failure(credential, PingStatus::Failed, 0.0, format!("Ping task failed: {}", err))
                }
            };
            result.service = credential.name().to_string();
            results.push(result);
        }

        tracing::info!(
            "Ping round finished: {} pings in {}ms",
            results.len(),
            started.elapsed().as_millis()
        );
        results
    }

    /// One record per slot, in slot order. With `include_ping`, a ping round
    /// runs after the balance round and is matched by service name.
    pub async fn aggregate_balances(&self, credentials: &[Credential], include_ping: bool) -> Vec<AggregatedRecord> {
        let probes = self.probe_all(credentials).await;

        let mut pings: HashMap<String, PingResult> = if include_ping {
            self.ping_all(credentials)
                .await
                .into_iter()
                .map(|ping| (ping.service.clone(), ping))
                .collect()
        } else {
            HashMap::new()
        };

        probes
            .iter()
            .map(|probe| {
                let ping = pings
                    .remove(&probe.service)
                    .unwrap_or_else(|| PingResult::not_tested(probe.service.clone(), probe.family()));
                format_record(probe, &ping)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        BalanceProbe, DeepSeekBalance, PingProbe, ProbeDetails, ProbeStatus, ProviderFamily,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock adapter: active with a fixed balance, optional delay, optional
    /// panic for one named slot.
    struct MockAdapter {
        delay: Duration,
        panic_for: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl MockAdapter {
        fn new() -> Self {
            Self {
                delay: Duration::ZERO,
                panic_for: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BalanceProbe for MockAdapter {
        fn name(&self) -> &'static str {
            "Mock"
        }

        async fn probe(&self, credential: &Credential) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !credential.is_configured() {
                return ProbeResult::not_configured(credential);
            }
            if self.panic_for == Some(credential.name()) {
                panic!("adapter blew up");
            }
            tokio::time::sleep(self.delay).await;
            ProbeResult {
                service: credential.name().to_string(),
                status: ProbeStatus::Active,
                details: ProbeDetails::DeepSeek(Some(DeepSeekBalance {
                    currency: "USD".to_string(),
                    total: 10.0,
                    granted: 0.0,
                    topped_up: 10.0,
                    balances: BTreeMap::new(),
                })),
                error: None,
                checked_at: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl PingProbe for MockAdapter {
        fn model(&self) -> &str {
            "deepseek/mock"
        }

        async fn ping(&self, credential: &Credential) -> PingResult {
            if !credential.is_configured() {
                return PingResult::not_configured(credential);
            }
            if self.panic_for == Some(credential.name()) {
                panic!("ping blew up");
            }
            tokio::time::sleep(self.delay).await;
            PingResult::success(credential, 0.42, "pong".to_string())
        }
    }

    fn aggregator_with(adapter: Arc<MockAdapter>) -> Aggregator {
        let mut registry = ProviderRegistry::empty();
        registry.register(ProviderFamily::DeepSeek, adapter.clone(), adapter.clone());
        registry.register(ProviderFamily::Gemini, adapter.clone(), adapter);
        Aggregator::new(registry)
    }

    fn deepseek_slots(count: usize) -> Vec<Credential> {
        (1..=count)
            .map(|i| Credential::new(ProviderFamily::DeepSeek, format!("DeepSeek Key {}", i), Some(format!("sk-{}", i))))
            .collect()
    }

    #[tokio::test]
    async fn returns_one_record_per_slot() {
        let aggregator = aggregator_with(Arc::new(MockAdapter::new()));

        for count in [0, 1, 3] {
            let records = aggregator.aggregate_balances(&deepseek_slots(count), false).await;
            assert_eq!(records.len(), count);
        }
    }

    #[tokio::test]
    async fn preserves_slot_order() {
        let aggregator = aggregator_with(Arc::new(MockAdapter::new()));
        let mut slots = deepseek_slots(3);
        slots.push(Credential::unconfigured(ProviderFamily::Gemini, "Gemini"));

        let records = aggregator.aggregate_balances(&slots, false).await;
        let services: Vec<&str> = records.iter().map(|r| r.service()).collect();
        assert_eq!(services, vec!["DeepSeek Key 1", "DeepSeek Key 2", "DeepSeek Key 3", "Gemini"]);
        assert_eq!(records[3].status(), ProbeStatus::NotConfigured);
    }

    #[tokio::test]
    async fn panicking_adapter_only_affects_its_slot() {
        let adapter = Arc::new(MockAdapter {
            panic_for: Some("DeepSeek Key 2"),
            ..MockAdapter::new()
        });
        let aggregator = aggregator_with(adapter);

        let records = aggregator.aggregate_balances(&deepseek_slots(3), true).await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].status(), ProbeStatus::Active);
        assert_eq!(records[1].status(), ProbeStatus::Error);
        assert_eq!(records[1].service(), "DeepSeek Key 2");
        assert!(records[1].display.error.as_deref().unwrap_or_default().starts_with("Probe task failed"));
        assert_eq!(records[2].status(), ProbeStatus::Active);
        assert_eq!(records[1].internals.ping_status, PingStatus::Failed);
        assert_eq!(records[2].internals.ping_status, PingStatus::Success);
    }

    #[tokio::test]
    async fn rounds_run_in_parallel() {
        let adapter = Arc::new(MockAdapter {
            delay: Duration::from_secs(1),
            ..MockAdapter::new()
        });
        let aggregator = aggregator_with(adapter);

        let started = Instant::now();
        let records = aggregator.aggregate_balances(&deepseek_slots(3), false).await;
        let elapsed = started.elapsed();

        assert_eq!(records.len(), 3);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn include_ping_fills_ping_fields() {
        let aggregator = aggregator_with(Arc::new(MockAdapter::new()));
        let mut slots = deepseek_slots(1);
        slots.push(Credential::unconfigured(ProviderFamily::Gemini, "Gemini"));

        let records = aggregator.aggregate_balances(&slots, true).await;

        assert_eq!(records[0].display.ping_test, "🟢 0.42s");
        assert_eq!(records[1].internals.ping_status, PingStatus::NotConfigured);
        assert_eq!(records[1].display.ping_test, "⚫ Not configured");
    }

    #[tokio::test]
    async fn without_ping_every_record_is_not_tested() {
        let aggregator = aggregator_with(Arc::new(MockAdapter::new()));
        let records = aggregator.aggregate_balances(&deepseek_slots(2), false).await;
        assert!(records.iter().all(|r| r.internals.ping_status == PingStatus::NotTested));
    }

    #[tokio::test]
    async fn ping_all_skips_balance_probes() {
        let adapter = Arc::new(MockAdapter::new());
        let aggregator = aggregator_with(adapter.clone());

        let pings = aggregator.ping_all(&deepseek_slots(3)).await;

        assert_eq!(pings.len(), 3);
        assert!(pings.iter().all(|p| p.status == PingStatus::Success));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_adapter_is_reported_per_slot() {
        let aggregator = Aggregator::new(ProviderRegistry::empty());
        let slots = vec![Credential::new(ProviderFamily::Gemini, "Gemini", Some("key".to_string()))];

        let records = aggregator.aggregate_balances(&slots, true).await;

        assert_eq!(records[0].status(), ProbeStatus::Error);
        assert_eq!(records[0].internals.ping_status, PingStatus::Failed);
    }
}
