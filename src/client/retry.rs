//! Backoff schedule for transient source API failures
//!
//! Delays grow as `base * 2^attempt` plus random jitter, are capped at the
//! configured maximum and never shrink from one retry to the next.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff iterator with jitter, a cap and a non-decreasing guarantee
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_jitter: Duration,
    attempt: u32,
    last: Duration,
}

impl Backoff {
    /// Create a backoff schedule from the retry configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    /// Number of delays handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry
    pub fn next_delay(&mut self) -> Duration {
        let exponential = self
            .base
            .checked_mul(2u32.saturating_pow(self.attempt))
            .unwrap_or(self.max);
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let millis = self.max_jitter.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
        };

        let capped = exponential.saturating_add(jitter).min(self.max);
        let delay = capped.max(self.last);

        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

/// Parse a `Retry-After` header value given as delta-seconds or an HTTP-date
///
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
