//! Adapter trait definitions

use async_trait::async_trait;
use super::{Credential, PingResult, ProbeResult};

/// Balance or validity check for one credential
///
/// Implementations never fail: every failure is folded into the returned
/// `ProbeResult`, and an unconfigured credential returns `not_configured`
/// without touching the network.
#[async_trait]
pub trait BalanceProbe: Send + Sync {
    async fn probe(&self, credential: &Credential) -> ProbeResult;

    /// Get the provider name for display
    fn name(&self) -> &'static str;
}

/// Minimal inference request measuring latency and liveness
#[async_trait]
pub trait PingProbe: Send + Sync {
    async fn ping(&self, credential: &Credential) -> PingResult;

    /// Model identifier used for the ping, `<family>/<model>`
    fn model(&self) -> &str;
}
