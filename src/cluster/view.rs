//! Composite read view over liveness and lag
//!
//! No independent state: every read recomputes from the heartbeat monitor
//! and the lag tracker, so the view can never disagree with its sources.

use super::heartbeat::{ActiveStandbyPartitions, HeartbeatMonitor};
use super::lag::{LagInfo, LagTracker, StoreLagMap};
use super::HostId;

use std::collections::HashMap;
use std::sync::Arc;

/// Everything the cluster knows about one host, merged.
#[derive(Debug, Clone)]
pub struct HostView {
    pub alive: bool,
    pub last_seen_ms: Option<i64>,
    pub active_standby_per_query: HashMap<String, ActiveStandbyPartitions>,
    pub per_store_lag: StoreLagMap,
}

/// Queryable snapshot of cluster state.
pub struct ClusterView {
    monitor: Arc<HeartbeatMonitor>,
    lags: Arc<LagTracker>,
}

impl ClusterView {
    pub fn new(monitor: Arc<HeartbeatMonitor>, lags: Arc<LagTracker>) -> Self {
        Self { monitor, lags }
    }

    pub fn local_host(&self) -> &HostId {
        self.monitor.local_host()
    }

    /// Merged view of one host, or None if the host was never seen.
    pub async fn host_view(&self, host: &HostId) -> Option<HostView> {
        let statuses = self.monitor.host_statuses().await;
        let status = statuses.get(host)?;
        Some(HostView {
            alive: status.alive && status.last_heartbeat_ms.is_some(),
            last_seen_ms: status.last_heartbeat_ms,
            active_standby_per_query: status.active_standby_per_query.clone(),
            per_store_lag: self.lags.host_lags(host).unwrap_or_default(),
        })
    }

    /// Merged view of every known host, for the cluster-status surface.
    pub async fn cluster_status(&self) -> HashMap<HostId, HostView> {
        let statuses = self.monitor.host_statuses().await;
        statuses
            .into_iter()
            .map(|(host, status)| {
                let per_store_lag = self.lags.host_lags(&host).unwrap_or_default();
                let view = HostView {
                    alive: status.alive && status.last_heartbeat_ms.is_some(),
                    last_seen_ms: status.last_heartbeat_ms,
                    active_standby_per_query: status.active_standby_per_query,
                    per_store_lag,
                };
                (host, view)
            })
            .collect()
    }

    /// Hosts currently considered alive.
    pub async fn alive_hosts(&self) -> Vec<HostId> {
        let statuses = self.monitor.host_statuses().await;
        statuses
            .into_iter()
            .filter(|(_, s)| s.alive && s.last_heartbeat_ms.is_some())
            .map(|(host, _)| host)
            .collect()
    }

    pub fn lag_for(&self, host: &HostId, store: &str, partition: u32) -> Option<LagInfo> {
        self.lags.get_lag(host, store, partition)
    }
}
