//! # Rowgate
//!
//! The cluster-coordination and live-result-delivery layer of a distributed
//! query-serving engine. Rowgate sits in front of a partitioned, replicated
//! stream-processing runtime and answers two hard questions: which replica
//! is fresh enough to serve a point-in-time read, and how to deliver every
//! produced row to an arbitrary set of subscribers without ever slowing the
//! shared pipeline.
//!
//! ## Key Features
//!
//! - **Heartbeat liveness**: peers exchange heartbeats on independent send,
//!   check, and discovery schedules; a host that has never been heard from
//!   is never assumed healthy
//! - **Lag-aware routing**: per-store, per-partition replication lag is
//!   aggregated cluster-wide and pull queries are routed to the freshest
//!   alive replica within a staleness bound
//! - **Non-blocking fan-out**: the pipeline's per-row callback copies each
//!   row once and offers it to every subscriber queue; a slow consumer loses
//!   only its own subscription, never anyone else's
//! - **Bounded subscriptions**: push queries are admitted against a
//!   concurrency quota and each rides a fixed-capacity buffer
//!
//! ## Architecture
//!
//! - **cluster**: heartbeat monitor, lag tracker, merged cluster view, and
//!   the host selector that routes pull queries
//! - **push**: per-subscriber queues, the fan-out registry tapping the
//!   pipeline, and the lifecycle manager gating registration
//! - **api**: axum HTTP surface for peers, operators, and subscribers

pub mod api;
pub mod clock;
pub mod cluster;
pub mod push;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

use cluster::ClusterConfig;
use push::PushConfig;

/// Configuration for a rowgate node
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Cluster coordination configuration
    pub cluster: ClusterConfig,
    /// Push subscription configuration
    pub push: PushConfig,
}

/// Re-exports for convenience
pub mod prelude {
    pub use crate::cluster::{
        ClusterConfig, ClusterView, HeartbeatMonitor, HostId, HostSelector, LagInfo, LagTracker,
    };
    pub use crate::push::{
        ProcessingQueue, PushConfig, PushQueryId, PushRegistry, QueryLifecycleManager,
    };
    pub use crate::{Config, Error, Result};
}
