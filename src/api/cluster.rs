//! Cluster coordination endpoints
//!
//! Peers POST heartbeats and lag reports here; operators and routing code
//! read the merged status and the two lag projections. Stale heartbeats
//! and lag reports are acknowledged like fresh ones: dropping them is
//! invisible by design.

use super::ApiState;
use crate::cluster::heartbeat::ActiveStandbyPartitions;
use crate::cluster::{HostId, LagInfo, StoreLagMap};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Heartbeat from a peer
#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub sender: HostId,
    pub timestamp_ms: i64,
}

/// Lag report from a peer
#[derive(Debug, Serialize, Deserialize)]
pub struct LagReportRequest {
    pub host: HostId,
    pub store_to_partition_to_lag: StoreLagMap,
    pub last_lag_update_ms: i64,
}

/// One host's entry in the cluster status response
#[derive(Debug, Serialize, Deserialize)]
pub struct HostStatusEntry {
    pub host_alive: bool,
    pub last_status_update_ms: Option<i64>,
    pub active_standby_per_query: HashMap<String, ActiveStandbyPartitions>,
    pub per_store_lag: StoreLagMap,
}

/// Cluster status response
#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterStatusResponse {
    pub hosts: HashMap<String, HostStatusEntry>,
}

/// Aggregated lag, host-major
#[derive(Debug, Serialize, Deserialize)]
pub struct LagsByHostResponse {
    pub hosts: HashMap<String, StoreLagMap>,
}

/// Aggregated lag, store-major
#[derive(Debug, Serialize, Deserialize)]
pub struct LagsByStoreResponse {
    pub stores: HashMap<String, HashMap<u32, HashMap<String, LagInfo>>>,
}

/// Record a heartbeat from a peer. Acknowledges with an empty body.
pub async fn receive_heartbeat(
    State(state): State<ApiState>,
    Json(request): Json<HeartbeatRequest>,
) -> StatusCode {
    state
        .monitor
        .record_heartbeat(&request.sender, request.timestamp_ms)
        .await;
    StatusCode::OK
}

/// Record a lag report from a peer. Acknowledges with an empty body.
pub async fn receive_lag_report(
    State(state): State<ApiState>,
    Json(request): Json<LagReportRequest>,
) -> StatusCode {
    state.lags.report_lag(
        &request.host,
        request.store_to_partition_to_lag,
        request.last_lag_update_ms,
    );
    StatusCode::OK
}

/// Merged liveness + lag view of every known host.
pub async fn cluster_status(State(state): State<ApiState>) -> Json<ClusterStatusResponse> {
    let status = state.view.cluster_status().await;
    let hosts = status
        .into_iter()
        .map(|(host, view)| {
            let entry = HostStatusEntry {
                host_alive: view.alive,
                last_status_update_ms: view.last_seen_ms,
                active_standby_per_query: view.active_standby_per_query,
                per_store_lag: view.per_store_lag,
            };
            (host.to_string(), entry)
        })
        .collect();
    Json(ClusterStatusResponse { hosts })
}

/// Host to store to partition to lag.
pub async fn lags_by_host(State(state): State<ApiState>) -> Json<LagsByHostResponse> {
    let hosts = state
        .lags
        .lags_by_host()
        .into_iter()
        .map(|(host, lags)| (host.to_string(), lags))
        .collect();
    Json(LagsByHostResponse { hosts })
}

/// Store to partition to host to lag.
pub async fn lags_by_store(State(state): State<ApiState>) -> Json<LagsByStoreResponse> {
    let stores = state
        .lags
        .lags_by_store()
        .into_iter()
        .map(|(store, partitions)| {
            let partitions = partitions
                .into_iter()
                .map(|(partition, hosts)| {
                    let hosts = hosts
                        .into_iter()
                        .map(|(host, lag)| (host.to_string(), lag))
                        .collect();
                    (partition, hosts)
                })
                .collect();
            (store, partitions)
        })
        .collect();
    Json(LagsByStoreResponse { stores })
}
