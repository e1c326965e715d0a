//! Monotonic wall-clock source
//!
//! Heartbeat and lag timestamps taken on this host must never go backward,
//! otherwise a newest-wins comparison could regress liveness state after an
//! NTP adjustment.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// A millisecond clock that guarantees monotonically increasing timestamps.
pub struct MonotonicClock {
    /// High-water mark: the largest timestamp we've ever returned (millis)
    high_water_ms: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            high_water_ms: AtomicI64::new(0),
        }
    }

    /// Returns a monotonically increasing millisecond timestamp.
    ///
    /// If the wall clock has gone backward (e.g. NTP adjustment), returns the
    /// previous high-water mark + 1ms instead.
    pub fn now_millis(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        loop {
            let prev = self.high_water_ms.load(Ordering::Acquire);
            let ts = wall.max(prev + 1);
            match self.high_water_ms.compare_exchange_weak(
                prev,
                ts,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return ts,
                Err(_) => continue, // CAS failed, retry
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_increasing() {
        let clock = MonotonicClock::new();
        let mut prev = 0i64;
        for _ in 0..100 {
            let ts = clock.now_millis();
            assert!(ts > prev, "timestamps must be strictly increasing");
            prev = ts;
        }
    }

    #[test]
    fn test_returns_recent_wall_time() {
        let clock = MonotonicClock::new();
        // Should be a reasonable time (after 2020)
        assert!(clock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_concurrent_monotonicity() {
        use std::sync::Arc;
        let clock = Arc::new(MonotonicClock::new());
        let mut handles = vec![];

        for _ in 0..4 {
            let c = clock.clone();
            handles.push(std::thread::spawn(move || {
                let mut prev = 0i64;
                for _ in 0..1000 {
                    let ts = c.now_millis();
                    // Each thread's own sequence should be increasing
                    assert!(ts > prev);
                    prev = ts;
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
    }
}
