use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Minimum spacing between outbound AI calls.
///
/// One instance is shared (behind an `Arc`) by every issuer. The lock is held
/// across the wait, so "read last stamp, sleep, write new stamp" is a single
/// section and queued callers are released one interval apart in FIFO order.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspend until `min_interval` has passed since the previous turn was
    /// granted, then stamp this turn.
    pub async fn await_turn(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                debug!(wait_ms = remaining.as_millis() as u64, "rate limiter holding request");
                sleep(remaining).await;
            }
        }

        *last = Some(Instant::now());
    }

    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}
