//! Integration tests for cluster coordination
//!
//! Covers liveness tracking, lag aggregation, and pull routing end to end
//! through the public library API.

use rowgate::clock::MonotonicClock;
use rowgate::cluster::{
    ClusterConfig, ClusterView, HeartbeatMonitor, HostId, HostSelector, LagInfo, LagTracker,
};
use rowgate::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct Cluster {
    monitor: Arc<HeartbeatMonitor>,
    lags: Arc<LagTracker>,
    view: Arc<ClusterView>,
    selector: HostSelector,
    clock: Arc<MonotonicClock>,
}

fn cluster(local: HostId, dead_threshold_ms: i64) -> Cluster {
    let clock = Arc::new(MonotonicClock::new());
    let monitor = Arc::new(HeartbeatMonitor::new(
        ClusterConfig {
            local_host: local,
            dead_threshold_ms,
            ..Default::default()
        },
        Arc::clone(&clock),
    ));
    let lags = Arc::new(LagTracker::new());
    let view = Arc::new(ClusterView::new(Arc::clone(&monitor), Arc::clone(&lags)));
    let selector = HostSelector::new(Arc::clone(&view));
    Cluster {
        monitor,
        lags,
        view,
        selector,
        clock,
    }
}

fn store_lags(store: &str, partition: u32, lag: u64) -> HashMap<String, HashMap<u32, LagInfo>> {
    let mut partitions = HashMap::new();
    partitions.insert(partition, LagInfo::new(1_000 - lag as i64, 1_000));
    let mut lags = HashMap::new();
    lags.insert(store.to_string(), partitions);
    lags
}

#[tokio::test]
async fn test_host_with_zero_heartbeats_is_never_alive() {
    let c = cluster(HostId::new("local", 1), 3_000);
    let silent = HostId::new("silent", 2);

    c.monitor.observe_host(silent.clone()).await;
    c.lags.report_lag(&silent, store_lags("orders", 0, 0), c.clock.now_millis());

    assert!(!c.monitor.is_alive(&silent).await);
    let view = c.view.host_view(&silent).await.unwrap();
    assert!(!view.alive, "lag reports alone must not imply liveness");
}

#[tokio::test]
async fn test_liveness_follows_heartbeats_through_checks() {
    let c = cluster(HostId::new("local", 1), 3_000);
    let host = HostId::new("peer", 2);

    // Heartbeats every 200ms up to t=1000.
    for t in (0..=1_000).step_by(200) {
        c.monitor.record_heartbeat(&host, t).await;
    }

    // Checks at 1s intervals: within threshold, still alive.
    c.monitor.check_at(2_000).await;
    assert!(c.monitor.is_alive(&host).await);
    c.monitor.check_at(3_000).await;
    assert!(c.monitor.is_alive(&host).await);

    // Heartbeats stopped at t=1000; threshold of 3000ms elapses at t=4000.
    c.monitor.check_at(4_000).await;
    assert!(!c.monitor.is_alive(&host).await);
    assert!(!c.view.alive_hosts().await.contains(&host));
}

#[tokio::test]
async fn test_heartbeat_stop_marks_dead_in_real_time() {
    let c = cluster(HostId::new("local", 1), 300);
    let host = HostId::new("peer", 2);

    // Live heartbeats for a while.
    for _ in 0..5 {
        c.monitor
            .record_heartbeat(&host, c.clock.now_millis())
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    c.monitor.check_once().await;
    assert!(c.monitor.is_alive(&host).await);

    // Silence for longer than the threshold.
    tokio::time::sleep(Duration::from_millis(400)).await;
    c.monitor.check_once().await;
    assert!(!c.monitor.is_alive(&host).await);
}

#[tokio::test]
async fn test_stale_lag_report_leaves_snapshot_unchanged() {
    let c = cluster(HostId::new("local", 1), 3_000);
    let host = HostId::new("peer", 2);

    assert!(c.lags.report_lag(&host, store_lags("orders", 0, 10), 5_000));
    assert!(!c.lags.report_lag(&host, store_lags("orders", 0, 0), 5_000));
    assert!(!c.lags.report_lag(&host, store_lags("orders", 0, 0), 4_000));

    assert_eq!(c.lags.get_lag(&host, "orders", 0).unwrap().lag(), 10);
}

#[tokio::test]
async fn test_selector_respects_bound_and_prefers_local_on_tie() {
    let local = HostId::new("local", 1);
    let c = cluster(local.clone(), 3_000);
    let remote_tied = HostId::new("remote-tied", 2);
    let remote_fresh = HostId::new("remote-fresh", 3);
    let remote_stale = HostId::new("remote-stale", 4);

    let now = c.clock.now_millis();
    for host in [&local, &remote_tied, &remote_fresh, &remote_stale] {
        c.monitor.record_heartbeat(host, now).await;
    }
    c.lags.report_lag(&local, store_lags("orders", 0, 5), now);
    c.lags.report_lag(&remote_tied, store_lags("orders", 0, 5), now);
    c.lags.report_lag(&remote_fresh, store_lags("orders", 0, 2), now);
    c.lags.report_lag(&remote_stale, store_lags("orders", 0, 500), now);

    let hosts = c.selector.select_hosts("orders", 0, 100).await.unwrap();

    // The stale host exceeds the bound while in-bound hosts exist.
    assert!(!hosts.contains(&remote_stale));
    // Ascending lag, local ahead of the equally-lagged remote.
    assert_eq!(hosts, vec![remote_fresh, local, remote_tied]);
}

#[tokio::test]
async fn test_selector_fallback_and_failure() {
    let c = cluster(HostId::new("local", 1), 3_000);
    let only = HostId::new("behind", 2);

    // Nothing alive at all: structured failure, not a retry.
    let err = c.selector.select_hosts("orders", 0, 10).await.unwrap_err();
    assert!(matches!(err, Error::NoHealthyReplica { .. }));

    // One alive host beyond the bound: fall back rather than fail.
    let now = c.clock.now_millis();
    c.monitor.record_heartbeat(&only, now).await;
    c.lags.report_lag(&only, store_lags("orders", 0, 999), now);
    let hosts = c.selector.select_hosts("orders", 0, 10).await.unwrap();
    assert_eq!(hosts, vec![only]);
}

#[tokio::test]
async fn test_cluster_status_merges_all_sources() {
    let c = cluster(HostId::new("local", 1), 3_000);
    let up = HostId::new("up", 2);
    let down = HostId::new("down", 3);

    let now = c.clock.now_millis();
    c.monitor.record_heartbeat(&up, now).await;
    c.monitor.observe_host(down.clone()).await;
    c.lags.report_lag(&up, store_lags("orders", 3, 7), now);

    let status = c.view.cluster_status().await;
    assert!(status[&up].alive);
    assert_eq!(status[&up].per_store_lag["orders"][&3].lag(), 7);
    assert!(!status[&down].alive);
    assert_eq!(status[&down].last_seen_ms, None);
}
