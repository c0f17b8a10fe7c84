// src/connectors/rate_limiter.rs
//! Global REST throttle.
//!
//! Kraken throttles per account, not per endpoint, so there is one clock for
//! all calls; the cost class only picks how long the caller must wait after
//! the previous permit.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostClass {
    Short,
    Long,
}

pub struct RateLimiter {
    short_interval: Duration,
    long_interval: Duration,
    /// Held across the wait so check-then-update is one step.
    last_permit: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(short_interval: Duration, long_interval: Duration) -> Self {
        Self {
            short_interval,
            long_interval,
            last_permit: Mutex::new(None),
        }
    }

    pub fn interval(&self, class: CostClass) -> Duration {
        match class {
            CostClass::Short => self.short_interval,
            CostClass::Long => self.long_interval,
        }
    }

    /// Waits until `interval(class)` has passed since the last permit of any
    /// class. Waiters queue on the mutex in FIFO order.
    pub async fn acquire(&self, class: CostClass) {
        let mut last = self.last_permit.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.interval(class);
            if ready_at > Instant::now() {
                debug!(
                    class = ?class,
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Throttling API call"
                );
                sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }
}
