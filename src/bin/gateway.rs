//! Rowgate gateway node: serves the cluster-coordination API and push
//! queries, and runs the heartbeat send/check/discovery loops.

use rowgate::api::{build_http_router, ApiState};
use rowgate::clock::MonotonicClock;
use rowgate::cluster::{
    ClusterConfig, ClusterView, HeartbeatMonitor, HostId, HostSelector, LagTracker,
    StaticClusterDiscovery,
};
use rowgate::push::{PushConfig, PushRegistry, QueryLifecycleManager};
use rowgate::telemetry::Telemetry;
use rowgate::Result;

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gateway", about = "Rowgate query-serving gateway")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8088")]
    listen: String,

    /// This host's advertised identity (host:port), as peers reach it
    #[arg(long, default_value = "127.0.0.1:8088")]
    advertised: HostId,

    /// Peer hosts (host:port), repeatable
    #[arg(long = "peer")]
    peers: Vec<HostId>,

    /// Interval between outbound heartbeats, in milliseconds
    #[arg(long, default_value_t = 100)]
    heartbeat_send_interval_ms: u64,

    /// Interval between liveness checks, in milliseconds
    #[arg(long, default_value_t = 200)]
    liveness_check_interval_ms: u64,

    /// Interval between discovery refreshes, in milliseconds
    #[arg(long, default_value_t = 2_000)]
    discovery_interval_ms: u64,

    /// Time without heartbeats before a peer is dead, in milliseconds
    #[arg(long, default_value_t = 600)]
    dead_threshold_ms: i64,

    /// Default staleness bound for pull routing, in offsets
    #[arg(long, default_value_t = u64::MAX)]
    default_max_lag: u64,

    /// Maximum concurrently open push queries
    #[arg(long, default_value_t = 100)]
    max_push_queries: usize,

    /// Per-subscriber buffer capacity, in rows
    #[arg(long, default_value_t = 1_000)]
    queue_capacity: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = Telemetry::init_for_component("rowgate-gateway", &args.log_level)?;

    let cluster_config = ClusterConfig {
        local_host: args.advertised.clone(),
        heartbeat_send_interval_ms: args.heartbeat_send_interval_ms,
        liveness_check_interval_ms: args.liveness_check_interval_ms,
        discovery_interval_ms: args.discovery_interval_ms,
        dead_threshold_ms: args.dead_threshold_ms,
        default_max_lag: args.default_max_lag,
    };
    let push_config = PushConfig {
        max_push_queries: args.max_push_queries,
        queue_capacity: args.queue_capacity,
    };

    let clock = Arc::new(MonotonicClock::new());
    let monitor = Arc::new(HeartbeatMonitor::new(cluster_config, clock));
    let lags = Arc::new(LagTracker::new());
    let view = Arc::new(ClusterView::new(Arc::clone(&monitor), Arc::clone(&lags)));
    let selector = Arc::new(HostSelector::new(Arc::clone(&view)));
    let registry = Arc::new(PushRegistry::new());
    let lifecycle = Arc::new(QueryLifecycleManager::new(
        Arc::clone(&registry),
        push_config.max_push_queries,
    ));

    let discovery = Arc::new(StaticClusterDiscovery::new(args.peers.clone()));
    for peer in args.peers {
        monitor.observe_host(peer).await;
    }

    let check_monitor = Arc::clone(&monitor);
    tokio::spawn(async move { check_monitor.run_check_loop().await });

    let send_monitor = Arc::clone(&monitor);
    let client = reqwest::Client::new();
    tokio::spawn(async move { send_monitor.run_send_loop(client).await });

    let discovery_monitor = Arc::clone(&monitor);
    tokio::spawn(async move { discovery_monitor.run_discovery_loop(discovery).await });

    let router = build_http_router(ApiState {
        monitor: Arc::clone(&monitor),
        lags,
        view,
        selector,
        lifecycle: Arc::clone(&lifecycle),
        push_config,
    });

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            ctrl_c_token.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!(
        "Gateway listening on {} as {}",
        args.listen,
        monitor.local_host()
    );

    let serve_token = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { serve_token.cancelled().await })
        .await?;

    registry.close();
    lifecycle.shutdown();
    info!("Gateway stopped");
    Ok(())
}
