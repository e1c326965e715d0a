//! Bounded per-subscriber row buffer
//!
//! Exactly one subscriber connection owns each queue. The producer side
//! (`offer`) never blocks: a full buffer is a subscriber fault, so the
//! queue closes itself with an overrun mark and that one subscription is
//! terminated, rather than the shared pipeline thread stalling or rows
//! being dropped silently. Close is an explicit terminal state; once
//! closed, offers fail without side effects and a blocked consumer read
//! unblocks with end-of-stream.

use super::row::Row;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(0);

/// Why a queue reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Explicit termination or unregistration
    Finished,
    /// The subscriber fell behind and its buffer filled
    Overrun,
    /// The underlying pipeline was torn down
    Shutdown,
}

/// Bounded buffer between the fan-out pass and one subscriber.
pub struct ProcessingQueue {
    id: u64,
    capacity: usize,
    buffer: Mutex<VecDeque<Arc<Row>>>,
    closed: AtomicBool,
    reason: Mutex<Option<CloseReason>>,
    notify: Notify,
}

impl ProcessingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            closed: AtomicBool::new(false),
            reason: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.reason.lock()
    }

    /// Offer a row without blocking. Returns false if the queue is closed
    /// or just overran; an overrun closes the queue.
    pub fn offer(&self, row: Arc<Row>) -> bool {
        if self.is_closed() {
            return false;
        }
        {
            let mut buffer = self.buffer.lock();
            if self.is_closed() {
                return false;
            }
            if buffer.len() >= self.capacity {
                drop(buffer);
                warn!(
                    "Subscriber queue {} overran its {}-row buffer, closing",
                    self.id, self.capacity
                );
                self.close_with(CloseReason::Overrun);
                return false;
            }
            buffer.push_back(row);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next row. Returns None after the queue is closed and
    /// drained; close is end-of-stream here, never an error.
    pub async fn recv(&self) -> Option<Arc<Row>> {
        loop {
            let notified = self.notify.notified();
            if let Some(row) = self.buffer.lock().pop_front() {
                return Some(row);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Close for normal termination. Idempotent.
    pub fn close(&self) {
        self.close_with(CloseReason::Finished);
    }

    pub(crate) fn close_with(&self, reason: CloseReason) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            *self.reason.lock() = Some(reason);
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn row(n: i64) -> Arc<Row> {
        Arc::new(Row::of(&[json!(n)], None, &[json!(n)], n))
    }

    #[tokio::test]
    async fn test_offer_then_recv_in_order() {
        let q = ProcessingQueue::new(8);
        assert!(q.offer(row(1)));
        assert!(q.offer(row(2)));

        assert_eq!(q.recv().await.unwrap().timestamp_ms, 1);
        assert_eq!(q.recv().await.unwrap().timestamp_ms, 2);
    }

    #[tokio::test]
    async fn test_recv_unblocks_on_close_with_end_of_stream() {
        let q = Arc::new(ProcessingQueue::new(8));
        let q2 = Arc::clone(&q);

        let consumer = tokio::spawn(async move { q2.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer must unblock")
            .unwrap();
        assert!(received.is_none(), "close is end-of-stream, not a row");
        assert_eq!(q.close_reason(), Some(CloseReason::Finished));
    }

    #[tokio::test]
    async fn test_close_drains_buffered_rows_first() {
        let q = ProcessingQueue::new(8);
        q.offer(row(1));
        q.close();

        assert_eq!(q.recv().await.unwrap().timestamp_ms, 1);
        assert!(q.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_offer_after_close_fails_without_side_effects() {
        let q = ProcessingQueue::new(8);
        q.close();
        assert!(!q.offer(row(1)));
        assert!(q.is_empty());
        assert_eq!(q.close_reason(), Some(CloseReason::Finished));
    }

    #[tokio::test]
    async fn test_overrun_closes_queue() {
        let q = ProcessingQueue::new(2);
        assert!(q.offer(row(1)));
        assert!(q.offer(row(2)));
        assert!(!q.offer(row(3)), "offer to a full queue must fail");

        assert!(q.is_closed());
        assert_eq!(q.close_reason(), Some(CloseReason::Overrun));
        // The rows accepted before the overrun are still drained.
        assert_eq!(q.recv().await.unwrap().timestamp_ms, 1);
        assert_eq!(q.recv().await.unwrap().timestamp_ms, 2);
        assert!(q.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_keeps_first_reason() {
        let q = ProcessingQueue::new(1);
        q.offer(row(1));
        assert!(!q.offer(row(2)));
        q.close();
        q.close();
        assert_eq!(q.close_reason(), Some(CloseReason::Overrun));
    }
}
