//! Bounded retry policy for connector calls
//!
//! Each connector is built with its own `RetryPolicy`; the policy hands out
//! an `ExponentialBackoff` per call so attempts are never shared between
//! addresses.

use super::config::SourceLimits;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 25% random delay on top of each backoff step
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    pub fn from_limits(limits: &SourceLimits) -> Self {
        Self::new(
            limits.max_attempts,
            Duration::from_millis(limits.base_backoff_ms),
            Duration::from_millis(limits.max_backoff_ms),
        )
    }

    /// Single attempt, no sleeping. Used by tests and fake connectors.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            policy: self.clone(),
            current_attempt: 0,
        }
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    /// Sleep before the next retry, or fail once the attempt budget is spent
    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        // The first attempt already happened before any sleep
        if self.current_attempt + 1 >= self.policy.max_attempts {
            return Err(MaxRetriesExceeded);
        }

        let mut delay = self.policy.delay_for(self.current_attempt);
        if self.policy.jitter && !delay.is_zero() {
            let extra_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 4);
            delay += Duration::from_millis(extra_ms);
        }

        log::debug!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 2,
            self.policy.max_attempts,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts_made(&self) -> u32 {
        self.current_attempt + 1
    }
}
