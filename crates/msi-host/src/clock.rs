//! Monotonic substrate clock.
//!
//! Timestamps are nanoseconds since the substrate was created. Deadlines in
//! the past, and non-positive durations, resolve immediately.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Runtime instant for an absolute clock reading.
    pub fn deadline(&self, t_nanos: u64) -> Instant {
        self.origin + Duration::from_nanos(t_nanos)
    }

    pub async fn sleep_until_nanos(&self, t_nanos: u64) {
        if t_nanos <= self.now_nanos() {
            return;
        }
        tokio::time::sleep_until(self.deadline(t_nanos)).await;
    }

    pub async fn sleep_nanos(&self, nanos: i64) {
        if nanos <= 0 {
            return;
        }
        tokio::time::sleep(Duration::from_nanos(nanos.unsigned_abs())).await;
    }
}
