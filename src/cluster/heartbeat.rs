//! Heartbeat exchange and liveness tracking
//!
//! Every host periodically POSTs a heartbeat to every peer it knows about.
//! The receiving side records the newest timestamp per sender and a check
//! loop, running on its own interval, marks hosts dead once the configured
//! threshold passes without an accepted heartbeat. A host that has never
//! sent a heartbeat is reported not-alive; there is no optimistic
//! default-alive state for freshly discovered peers.

use super::telemetry;
use super::{ClusterConfig, HostId};
use crate::clock::MonotonicClock;
use crate::Result;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Active and standby partitions a host owns for one persistent query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStandbyPartitions {
    pub active_partitions: Vec<u32>,
    pub standby_partitions: Vec<u32>,
}

/// Liveness state of one peer as seen from this host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostStatus {
    /// True only while accepted heartbeats keep arriving within the threshold
    pub alive: bool,
    /// Newest accepted heartbeat timestamp; None until the first one arrives
    pub last_heartbeat_ms: Option<i64>,
    /// Query name to the partitions this host serves as active/standby
    pub active_standby_per_query: HashMap<String, ActiveStandbyPartitions>,
}

/// Source of cluster membership.
///
/// The surrounding runtime owns the authoritative member list; this seam lets
/// the heartbeat sender learn about peers without caring where they come from.
#[async_trait]
pub trait ClusterDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<HostId>>;
}

/// Fixed membership, for static deployments and tests.
pub struct StaticClusterDiscovery {
    hosts: Vec<HostId>,
}

impl StaticClusterDiscovery {
    pub fn new(hosts: Vec<HostId>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl ClusterDiscovery for StaticClusterDiscovery {
    async fn discover(&self) -> Result<Vec<HostId>> {
        Ok(self.hosts.clone())
    }
}

/// Tracks per-peer liveness from heartbeat exchange.
pub struct HeartbeatMonitor {
    hosts: RwLock<HashMap<HostId, HostStatus>>,
    config: ClusterConfig,
    clock: Arc<MonotonicClock>,
}

impl HeartbeatMonitor {
    pub fn new(config: ClusterConfig, clock: Arc<MonotonicClock>) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn local_host(&self) -> &HostId {
        &self.config.local_host
    }

    /// Record a heartbeat from a peer.
    ///
    /// Applied only if `sent_at_ms` is newer than the stored timestamp;
    /// out-of-order deliveries are dropped so reordering cannot regress
    /// liveness state. Returns whether the heartbeat was applied.
    pub async fn record_heartbeat(&self, sender: &HostId, sent_at_ms: i64) -> bool {
        let mut hosts = self.hosts.write().await;
        let status = hosts.entry(sender.clone()).or_default();

        if let Some(prev) = status.last_heartbeat_ms {
            if prev >= sent_at_ms {
                debug!(
                    "Dropping out-of-order heartbeat from {}: {} <= stored {}",
                    sender, sent_at_ms, prev
                );
                telemetry::record_heartbeat("stale");
                return false;
            }
        } else {
            info!("First heartbeat from {}", sender);
        }

        if !status.alive && status.last_heartbeat_ms.is_some() {
            info!("Host {} recovered", sender);
        }
        status.last_heartbeat_ms = Some(sent_at_ms);
        status.alive = true;
        telemetry::record_heartbeat("applied");
        true
    }

    /// True only if at least one heartbeat was accepted and the host has not
    /// been marked dead by a liveness check since.
    pub async fn is_alive(&self, host: &HostId) -> bool {
        self.hosts
            .read()
            .await
            .get(host)
            .map(|s| s.alive && s.last_heartbeat_ms.is_some())
            .unwrap_or(false)
    }

    /// Make a host known without assuming anything about its health.
    pub async fn observe_host(&self, host: HostId) {
        let mut hosts = self.hosts.write().await;
        if !hosts.contains_key(&host) {
            debug!("Discovered host {}", host);
            hosts.insert(host, HostStatus::default());
        }
    }

    /// Replace the active/standby partition assignment reported for a host.
    pub async fn record_active_standby(
        &self,
        host: &HostId,
        per_query: HashMap<String, ActiveStandbyPartitions>,
    ) {
        let mut hosts = self.hosts.write().await;
        hosts.entry(host.clone()).or_default().active_standby_per_query = per_query;
    }

    /// Snapshot of every known host's status.
    pub async fn host_statuses(&self) -> HashMap<HostId, HostStatus> {
        self.hosts.read().await.clone()
    }

    /// All hosts this monitor has ever seen, discovered or heard from.
    pub async fn known_hosts(&self) -> Vec<HostId> {
        self.hosts.read().await.keys().cloned().collect()
    }

    /// One liveness evaluation at the given time. Returns the alive count.
    pub async fn check_at(&self, now_ms: i64) -> usize {
        let mut hosts = self.hosts.write().await;
        let mut alive = 0;

        for (host, status) in hosts.iter_mut() {
            let Some(last) = status.last_heartbeat_ms else {
                continue;
            };
            let elapsed = now_ms - last;
            if status.alive && elapsed >= self.config.dead_threshold_ms {
                warn!(
                    "Host {} missed heartbeats for {}ms, marking as dead",
                    host, elapsed
                );
                status.alive = false;
            }
            if status.alive {
                alive += 1;
            }
        }
        alive
    }

    /// One liveness evaluation against the monitor's clock.
    pub async fn check_once(&self) -> usize {
        self.check_at(self.clock.now_millis()).await
    }

    /// Run periodic liveness checks. Runs until the task is dropped.
    pub async fn run_check_loop(&self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.liveness_check_interval_ms));
        loop {
            interval.tick().await;
            self.check_once().await;
        }
    }

    /// Send heartbeats to every known peer on the send interval.
    pub async fn run_send_loop(&self, client: reqwest::Client) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat_send_interval_ms));
        loop {
            interval.tick().await;

            let peers = self.known_hosts().await;
            let sent_at = self.clock.now_millis();
            for peer in peers {
                if peer == self.config.local_host {
                    continue;
                }
                let url = format!("http://{}/cluster/heartbeat", peer);
                let body = serde_json::json!({
                    "sender": self.config.local_host,
                    "timestamp_ms": sent_at,
                });
                if let Err(e) = client.post(&url).json(&body).send().await {
                    // The peer's own threshold on our side handles the rest.
                    debug!("Heartbeat to {} failed: {}", peer, e);
                }
            }
        }
    }

    /// Refresh the known peer set on the discovery interval.
    pub async fn run_discovery_loop(&self, discovery: Arc<dyn ClusterDiscovery>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.discovery_interval_ms));
        loop {
            interval.tick().await;
            match discovery.discover().await {
                Ok(hosts) => {
                    for host in hosts {
                        if host != self.config.local_host {
                            self.observe_host(host).await;
                        }
                    }
                }
                Err(e) => warn!("Cluster discovery failed: {}", e),
            }
        }
    }
}
