//! Cluster coordination for rowgate
//!
//! Tracks peer liveness from heartbeat exchange, aggregates per-store
//! replication lag reported by each host, and selects the freshest replica
//! for pull queries. Cluster state is eventually consistent and advisory:
//! the staleness bound is a best-effort routing hint, not an enforced
//! consistency guarantee.

pub mod heartbeat;
pub mod lag;
pub mod selector;
mod telemetry;
pub mod view;

pub use heartbeat::{
    ActiveStandbyPartitions, ClusterDiscovery, HeartbeatMonitor, HostStatus,
    StaticClusterDiscovery,
};
pub use lag::{LagInfo, LagTracker, StoreLagMap};
pub use selector::HostSelector;
pub use view::{ClusterView, HostView};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a peer host. Immutable, hashable, used as the key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId {
    pub host: String,
    pub port: u16,
}

impl HostId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for HostId {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("invalid host id '{}', expected host:port", value))?;
        if host.is_empty() {
            return Err(format!("invalid host id '{}', empty host", value));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in host id '{}': {}", value, e))?;
        Ok(Self::new(host, port))
    }
}

/// Cluster configuration
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// This host's advertised identity
    pub local_host: HostId,
    /// Interval between outbound heartbeats to each peer
    pub heartbeat_send_interval_ms: u64,
    /// Interval between liveness evaluations (independent of the send interval)
    pub liveness_check_interval_ms: u64,
    /// Interval between cluster-membership discovery refreshes
    pub discovery_interval_ms: u64,
    /// A host is dead once this much time passes without an accepted heartbeat
    pub dead_threshold_ms: i64,
    /// Default per-partition staleness bound for pull routing, in offsets
    pub default_max_lag: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            local_host: HostId::new("127.0.0.1", 8088),
            heartbeat_send_interval_ms: 100,
            liveness_check_interval_ms: 200,
            discovery_interval_ms: 2_000,
            dead_threshold_ms: 600,
            default_max_lag: u64::MAX,
        }
    }
}
