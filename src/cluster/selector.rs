//! Freshness-aware replica selection for pull queries

use super::telemetry;
use super::view::ClusterView;
use super::HostId;
use crate::{Error, Result};

use std::sync::Arc;
use tracing::debug;

/// Ranks candidate hosts for a (store, partition) read.
pub struct HostSelector {
    view: Arc<ClusterView>,
}

impl HostSelector {
    pub fn new(view: Arc<ClusterView>) -> Self {
        Self { view }
    }

    /// Hosts able to serve a pull query for (store, partition), best first.
    ///
    /// Alive hosts whose lag is within `max_acceptable_lag` are returned in
    /// ascending lag order, the local host winning exact ties so an equal
    /// answer never costs a network hop. If no alive host satisfies the
    /// bound, all alive hosts are returned least-lagged first rather than
    /// failing outright; hosts that never reported lag for the partition
    /// rank last. Only a cluster with no alive host at all is an error.
    ///
    /// The bound is a best-effort routing hint over eventually consistent
    /// lag reports, not a consistency guarantee: the chosen replica may have
    /// drifted since its last report.
    pub async fn select_hosts(
        &self,
        store: &str,
        partition: u32,
        max_acceptable_lag: u64,
    ) -> Result<Vec<HostId>> {
        let alive = self.view.alive_hosts().await;
        if alive.is_empty() {
            telemetry::record_routing_failure();
            return Err(Error::NoHealthyReplica {
                store: store.to_string(),
                partition,
            });
        }

        let local = self.view.local_host().clone();
        let mut candidates: Vec<(u64, bool, HostId)> = alive
            .into_iter()
            .map(|host| {
                let lag = self
                    .view
                    .lag_for(&host, store, partition)
                    .map(|l| l.lag())
                    .unwrap_or(u64::MAX);
                let is_local = host == local;
                (lag, is_local, host)
            })
            .collect();

        let within_bound: Vec<(u64, bool, HostId)> = candidates
            .iter()
            .filter(|(lag, _, _)| *lag <= max_acceptable_lag)
            .cloned()
            .collect();

        let mut chosen = if within_bound.is_empty() {
            debug!(
                "No host within lag bound {} for {}/{}, falling back to least-lagged",
                max_acceptable_lag, store, partition
            );
            candidates.sort_by_key(|(lag, is_local, _)| (*lag, !*is_local));
            candidates
        } else {
            let mut within = within_bound;
            within.sort_by_key(|(lag, is_local, _)| (*lag, !*is_local));
            within
        };

        let first_is_local = chosen.first().map(|(_, is_local, _)| *is_local).unwrap_or(false);
        let satisfied_bound = chosen
            .first()
            .map(|(lag, _, _)| *lag <= max_acceptable_lag)
            .unwrap_or(false);
        telemetry::record_routing_decision(
            if first_is_local { "local" } else { "remote" },
            satisfied_bound,
        );

        Ok(chosen.drain(..).map(|(_, _, host)| host).collect())
    }
}
