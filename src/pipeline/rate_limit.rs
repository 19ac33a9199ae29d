//! Per-source rate limiting
//!
//! Two independent knobs per source: a requests-per-minute quota (governor)
//! and a minimum spacing between consecutive requests.

use super::config::SourceLimits;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct SourceRateLimiter {
    quota: DirectLimiter,
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl SourceRateLimiter {
    pub fn new(requests_per_minute: u32, min_delay: Duration) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            quota: RateLimiter::direct(Quota::per_minute(per_minute)),
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn from_limits(limits: &SourceLimits) -> Self {
        Self::new(limits.requests_per_minute, Duration::from_millis(limits.min_delay_ms))
    }

    /// No quota worth mentioning and no spacing. Used by tests.
    pub fn unlimited() -> Self {
        Self::new(u32::MAX, Duration::ZERO)
    }

    /// Wait until a request to this source is allowed
    pub async fn acquire(&self) {
        self.quota.until_ready().await;

        if self.min_delay.is_zero() {
            return;
        }

        // Lock held across the sleep: callers are spaced one after another
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.min_delay).await;
        }
        *last = Some(Instant::now());
    }
}
