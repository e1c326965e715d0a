//! Replication lag aggregation
//!
//! Each host periodically reports, per state store and partition, how far
//! its replica trails the end of the changelog. Reports are replaced
//! whole-host and only by strictly newer timestamps, so retransmission and
//! reordering leave the snapshot unchanged. Entries survive stale reports;
//! they are only ever superseded.

use super::telemetry;
use super::HostId;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Offset progress of one replica for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagInfo {
    pub current_offset: i64,
    pub end_offset: i64,
}

impl LagInfo {
    pub fn new(current_offset: i64, end_offset: i64) -> Self {
        Self {
            current_offset,
            end_offset,
        }
    }

    /// How far the replica trails the end offset. Never negative, even when
    /// a racy report puts the current offset past the observed end.
    pub fn lag(&self) -> u64 {
        (self.end_offset - self.current_offset).max(0) as u64
    }
}

/// Store name to partition to lag, as reported by one host.
pub type StoreLagMap = HashMap<String, HashMap<u32, LagInfo>>;

#[derive(Debug, Clone)]
struct HostLags {
    lags: StoreLagMap,
    updated_at_ms: i64,
}

/// Stores and aggregates per-host lag reports.
pub struct LagTracker {
    hosts: DashMap<HostId, HostLags>,
}

impl LagTracker {
    pub fn new() -> Self {
        Self {
            hosts: DashMap::new(),
        }
    }

    /// Replace a host's lag snapshot if the report is strictly newer than
    /// the stored one. Returns whether the report was applied.
    pub fn report_lag(&self, host: &HostId, lags: StoreLagMap, reported_at_ms: i64) -> bool {
        match self.hosts.entry(host.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().updated_at_ms >= reported_at_ms {
                    debug!(
                        "Dropping stale lag report from {}: {} <= stored {}",
                        host,
                        reported_at_ms,
                        entry.get().updated_at_ms
                    );
                    telemetry::record_lag_report("stale");
                    return false;
                }
                entry.insert(HostLags {
                    lags,
                    updated_at_ms: reported_at_ms,
                });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(HostLags {
                    lags,
                    updated_at_ms: reported_at_ms,
                });
            }
        }
        telemetry::record_lag_report("applied");
        true
    }

    /// Lag of one replica for one (store, partition), if ever reported.
    pub fn get_lag(&self, host: &HostId, store: &str, partition: u32) -> Option<LagInfo> {
        self.hosts
            .get(host)
            .and_then(|entry| entry.lags.get(store).and_then(|p| p.get(&partition)).copied())
    }

    /// Full snapshot for one host.
    pub fn host_lags(&self, host: &HostId) -> Option<StoreLagMap> {
        self.hosts.get(host).map(|entry| entry.lags.clone())
    }

    /// When the host's snapshot was last replaced.
    pub fn updated_at(&self, host: &HostId) -> Option<i64> {
        self.hosts.get(host).map(|entry| entry.updated_at_ms)
    }

    /// Projection: host to store to partition to lag.
    pub fn lags_by_host(&self) -> HashMap<HostId, StoreLagMap> {
        self.hosts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lags.clone()))
            .collect()
    }

    /// Projection: store to partition to host to lag. Same snapshot as
    /// [`lags_by_host`](Self::lags_by_host), pivoted; there is no separate
    /// source of truth.
    pub fn lags_by_store(&self) -> HashMap<String, HashMap<u32, HashMap<HostId, LagInfo>>> {
        let mut by_store: HashMap<String, HashMap<u32, HashMap<HostId, LagInfo>>> = HashMap::new();
        for entry in self.hosts.iter() {
            for (store, partitions) in &entry.value().lags {
                let store_entry = by_store.entry(store.clone()).or_default();
                for (partition, lag) in partitions {
                    store_entry
                        .entry(*partition)
                        .or_default()
                        .insert(entry.key().clone(), *lag);
                }
            }
        }
        by_store
    }
}

impl Default for LagTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_lags(store: &str, partition: u32, current: i64, end: i64) -> StoreLagMap {
        let mut partitions = HashMap::new();
        partitions.insert(partition, LagInfo::new(current, end));
        let mut lags = HashMap::new();
        lags.insert(store.to_string(), partitions);
        lags
    }

    #[test]
    fn test_lag_never_negative() {
        assert_eq!(LagInfo::new(120, 100).lag(), 0);
        assert_eq!(LagInfo::new(80, 100).lag(), 20);
    }

    #[test]
    fn test_stale_report_ignored() {
        let tracker = LagTracker::new();
        let host = HostId::new("10.0.0.1", 8088);

        assert!(tracker.report_lag(&host, store_lags("orders", 0, 50, 100), 2_000));
        assert!(
            !tracker.report_lag(&host, store_lags("orders", 0, 90, 100), 2_000),
            "equal timestamp must be ignored"
        );
        assert!(
            !tracker.report_lag(&host, store_lags("orders", 0, 99, 100), 1_000),
            "older timestamp must be ignored"
        );

        // Snapshot unchanged by the stale reports.
        let lag = tracker.get_lag(&host, "orders", 0).unwrap();
        assert_eq!(lag, LagInfo::new(50, 100));
        assert_eq!(tracker.updated_at(&host), Some(2_000));
    }

    #[test]
    fn test_newer_report_replaces_whole_host() {
        let tracker = LagTracker::new();
        let host = HostId::new("10.0.0.1", 8088);

        tracker.report_lag(&host, store_lags("orders", 0, 50, 100), 1_000);
        tracker.report_lag(&host, store_lags("users", 1, 10, 10), 2_000);

        // The orders entry was superseded along with the rest of the host.
        assert!(tracker.get_lag(&host, "orders", 0).is_none());
        assert_eq!(tracker.get_lag(&host, "users", 1), Some(LagInfo::new(10, 10)));
    }

    #[test]
    fn test_views_project_same_snapshot() {
        let tracker = LagTracker::new();
        let a = HostId::new("a", 1);
        let b = HostId::new("b", 2);
        tracker.report_lag(&a, store_lags("orders", 0, 90, 100), 1_000);
        tracker.report_lag(&b, store_lags("orders", 0, 100, 100), 1_000);

        let by_host = tracker.lags_by_host();
        assert_eq!(by_host[&a]["orders"][&0].lag(), 10);
        assert_eq!(by_host[&b]["orders"][&0].lag(), 0);

        let by_store = tracker.lags_by_store();
        let hosts = &by_store["orders"][&0];
        assert_eq!(hosts[&a].lag(), 10);
        assert_eq!(hosts[&b].lag(), 0);
    }

    #[test]
    fn test_unknown_lag_is_none() {
        let tracker = LagTracker::new();
        let host = HostId::new("a", 1);
        assert!(tracker.get_lag(&host, "orders", 0).is_none());
        tracker.report_lag(&host, store_lags("orders", 0, 0, 0), 1_000);
        assert!(tracker.get_lag(&host, "orders", 7).is_none());
    }
}
