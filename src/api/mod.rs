//! HTTP API for cluster coordination and push queries
//!
//! Surfaces:
//! - Heartbeat and lag-report receipt from peers
//! - Cluster status and aggregated lag views
//! - Push query streaming (newline-delimited rows) and termination
//! - Health/readiness probes

pub mod cluster;
pub mod push;
pub(crate) mod telemetry;

pub use telemetry::{record_query, QueryMetrics};

use crate::cluster::{ClusterView, HeartbeatMonitor, HostSelector, LagTracker};
use crate::push::{PushConfig, QueryLifecycleManager};

use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared API state
#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<HeartbeatMonitor>,
    pub lags: Arc<LagTracker>,
    pub view: Arc<ClusterView>,
    pub selector: Arc<HostSelector>,
    pub lifecycle: Arc<QueryLifecycleManager>,
    pub push_config: PushConfig,
}

/// Build the HTTP API router
pub fn build_http_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        // Cluster coordination
        .route("/cluster/heartbeat", post(cluster::receive_heartbeat))
        .route("/cluster/lag", post(cluster::receive_lag_report))
        .route("/cluster/status", get(cluster::cluster_status))
        .route("/cluster/lags", get(cluster::lags_by_host))
        .route("/cluster/lags/by-store", get(cluster::lags_by_store))
        // Push queries
        .route("/query/push", post(push::open_push_query))
        .route("/query/push/terminate", post(push::terminate_push_query))
        .with_state(state)
        .layer(middleware::from_fn(telemetry::http_observability_middleware))
        .layer(cors)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint
async fn ready_check() -> &'static str {
    "READY"
}
