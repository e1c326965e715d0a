//! Cluster-path telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct ClusterInstruments {
    heartbeats_received: Counter<u64>,
    lag_reports_received: Counter<u64>,
    routing_decisions: Counter<u64>,
    routing_failures: Counter<u64>,
}

fn instruments() -> &'static ClusterInstruments {
    static INSTRUMENTS: OnceLock<ClusterInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("rowgate.cluster");
        ClusterInstruments {
            heartbeats_received: meter
                .u64_counter("rowgate.cluster.heartbeats.received")
                .with_description("Heartbeats received by outcome (applied/stale)")
                .init(),
            lag_reports_received: meter
                .u64_counter("rowgate.cluster.lag_reports.received")
                .with_description("Lag reports received by outcome (applied/stale)")
                .init(),
            routing_decisions: meter
                .u64_counter("rowgate.cluster.routing.decisions")
                .with_description("Pull routing decisions by destination (local/remote)")
                .init(),
            routing_failures: meter
                .u64_counter("rowgate.cluster.routing.failures")
                .with_description("Pull routing attempts with no healthy replica")
                .init(),
        }
    })
}

pub fn record_heartbeat(outcome: &'static str) {
    instruments()
        .heartbeats_received
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_lag_report(outcome: &'static str) {
    instruments()
        .lag_reports_received
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_routing_decision(destination: &'static str, within_bound: bool) {
    instruments().routing_decisions.add(
        1,
        &[
            KeyValue::new("destination", destination),
            KeyValue::new("within_bound", within_bound),
        ],
    );
}

pub fn record_routing_failure() {
    instruments().routing_failures.add(1, &[]);
}
