//! Read-only relay statistics.
//!
//! Every snapshot field is read from the live component at call time;
//! only the per-outcome delivery counters are owned here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::relay::dedup::DedupTracker;
use crate::relay::matcher::KeywordPolicy;
use crate::relay::types::DeliveryOutcome;

/// Source of the number of servers the relay is connected to.
pub trait ServerDirectory: Send + Sync {
    fn server_count(&self) -> usize;
}

/// Point-in-time view of relay state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub server_count: usize,
    pub keyword_count: usize,
    pub dedup_set_size: usize,
    pub forwarded: u64,
    pub sink_unavailable: u64,
    pub permission_denied: u64,
    pub transient_errors: u64,
}

/// Counts delivery outcomes and exposes live relay statistics.
pub struct StatsCollector {
    policy: Arc<KeywordPolicy>,
    dedup: Arc<DedupTracker>,
    servers: Option<Arc<dyn ServerDirectory>>,
    forwarded: AtomicU64,
    sink_unavailable: AtomicU64,
    permission_denied: AtomicU64,
    transient_errors: AtomicU64,
}

impl StatsCollector {
    pub fn new(policy: Arc<KeywordPolicy>, dedup: Arc<DedupTracker>) -> Self {
        Self {
            policy,
            dedup,
            servers: None,
            forwarded: AtomicU64::new(0),
            sink_unavailable: AtomicU64::new(0),
            permission_denied: AtomicU64::new(0),
            transient_errors: AtomicU64::new(0),
        }
    }

    /// Attach the platform's server directory.
    pub fn with_server_directory(mut self, servers: Arc<dyn ServerDirectory>) -> Self {
        self.servers = Some(servers);
        self
    }

    /// Count one delivery outcome.
    pub fn record(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Delivered => &self.forwarded,
            DeliveryOutcome::SinkUnavailable => &self.sink_unavailable,
            DeliveryOutcome::PermissionDenied => &self.permission_denied,
            DeliveryOutcome::TransientError(_) => &self.transient_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages successfully forwarded since startup.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            server_count: self.servers.as_ref().map_or(0, |s| s.server_count()),
            keyword_count: self.policy.len(),
            dedup_set_size: self.dedup.len().await,
            forwarded: self.forwarded(),
            sink_unavailable: self.sink_unavailable.load(Ordering::Relaxed),
            permission_denied: self.permission_denied.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedServers(usize);

    impl ServerDirectory for FixedServers {
        fn server_count(&self) -> usize {
            self.0
        }
    }

    fn collector() -> (StatsCollector, Arc<DedupTracker>) {
        let policy = Arc::new(KeywordPolicy::new(["dev", "bounty", "ctf"]).unwrap());
        let dedup = Arc::new(DedupTracker::default());
        (StatsCollector::new(policy, Arc::clone(&dedup)), dedup)
    }

    #[tokio::test]
    async fn snapshot_reads_live_state() {
        let (stats, dedup) = collector();
        let stats = stats.with_server_directory(Arc::new(FixedServers(4)));

        assert_eq!(stats.snapshot().await.dedup_set_size, 0);
        dedup.mark("a").await;
        dedup.mark("b").await;

        let snap = stats.snapshot().await;
        assert_eq!(snap.server_count, 4);
        assert_eq!(snap.keyword_count, 3);
        assert_eq!(snap.dedup_set_size, 2);
    }

    #[tokio::test]
    async fn records_each_outcome_separately() {
        let (stats, _) = collector();
        stats.record(&DeliveryOutcome::Delivered);
        stats.record(&DeliveryOutcome::Delivered);
        stats.record(&DeliveryOutcome::PermissionDenied);
        stats.record(&DeliveryOutcome::SinkUnavailable);
        stats.record(&DeliveryOutcome::TransientError("x".into()));

        let snap = stats.snapshot().await;
        assert_eq!(snap.forwarded, 2);
        assert_eq!(snap.permission_denied, 1);
        assert_eq!(snap.sink_unavailable, 1);
        assert_eq!(snap.transient_errors, 1);
        assert_eq!(snap.server_count, 0);
    }
}
