//! Push-query delivery for rowgate
//!
//! A single pipeline thread produces rows; an arbitrary, changing set of
//! subscribers consumes them. The registry taps the pipeline's per-row
//! callback and offers an immutable copy of each row to every registered
//! queue without ever blocking the producer; the lifecycle manager gates
//! registration behind a concurrency quota and owns teardown when a
//! subscriber terminates or its connection drops.

pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod row;

pub use lifecycle::{ConnectionId, PushQueryHandle, PushQueryId, QueryLifecycleManager};
pub use queue::{CloseReason, ProcessingQueue};
pub use registry::PushRegistry;
pub use row::{Row, RowKey, WindowBound};

/// Push subscription configuration
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Maximum number of concurrently open push queries
    pub max_push_queries: usize,
    /// Fixed buffer capacity of each subscriber queue, in rows
    pub queue_capacity: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            max_push_queries: 100,
            queue_capacity: 1_000,
        }
    }
}
