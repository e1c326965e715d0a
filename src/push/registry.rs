//! Fan-out tap on the pipeline's row stream
//!
//! A single producer thread invokes `on_row` once per output row; consumers
//! register and unregister queues concurrently from request threads. The
//! active set is a sharded concurrent map, so iteration during a fan-out
//! pass is weakly consistent with mutation: a row mid-pass may or may not
//! reach a queue registered or removed during that pass, but after
//! `unregister` returns no later row does. A newly registered subscriber
//! catches up through the materialized-state snapshot path, not the live
//! tap, so the weak consistency is acceptable.
//!
//! `on_row` runs in the pipeline's invocation context and must only copy
//! and enqueue: no blocking, no sleeping, no I/O.

use super::queue::{CloseReason, ProcessingQueue};
use super::row::{Row, WindowBound};

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of the queues currently receiving the live row stream.
pub struct PushRegistry {
    queues: DashMap<u64, Arc<ProcessingQueue>>,
}

impl PushRegistry {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Add a queue to the active set.
    pub fn register(&self, queue: Arc<ProcessingQueue>) {
        debug!("Registering subscriber queue {}", queue.id());
        self.queues.insert(queue.id(), queue);
    }

    /// Remove a queue from the active set. After this returns, no future
    /// row reaches the queue; one in-flight offer from a pass that started
    /// earlier may still land.
    pub fn unregister(&self, queue: &ProcessingQueue) {
        if self.queues.remove(&queue.id()).is_some() {
            debug!("Unregistered subscriber queue {}", queue.id());
        }
    }

    /// Per-row hook invoked by the producer thread.
    ///
    /// Key and value columns are borrowed from the pipeline's reusable
    /// buffers and deep-copied exactly once into an immutable [`Row`]; each
    /// registered queue gets a handle to that copy. A rejected offer is a
    /// per-subscriber fault (the queue closes itself on overrun) and never
    /// aborts the pass or reaches the producer.
    pub fn on_row(
        &self,
        key_columns: &[serde_json::Value],
        window: Option<WindowBound>,
        value_columns: &[serde_json::Value],
        timestamp_ms: i64,
    ) {
        if self.queues.is_empty() {
            return;
        }

        let row = Arc::new(Row::of(key_columns, window, value_columns, timestamp_ms));
        for entry in self.queues.iter() {
            let queue = entry.value();
            if !queue.offer(Arc::clone(&row)) {
                debug!(
                    "Row at {} not delivered to queue {} (closed or overrun)",
                    timestamp_ms,
                    queue.id()
                );
            }
        }
    }

    /// Close every registered queue; used when the pipeline is torn down.
    /// Blocked consumer reads unblock with end-of-stream.
    pub fn close(&self) {
        info!("Closing {} subscriber queues for shutdown", self.queues.len());
        for entry in self.queues.iter() {
            entry.value().close_with(CloseReason::Shutdown);
        }
    }

    /// Number of queues currently registered.
    pub fn num_registered(&self) -> usize {
        self.queues.len()
    }
}

impl Default for PushRegistry {
    fn default() -> Self {
        Self::new()
    }
}
