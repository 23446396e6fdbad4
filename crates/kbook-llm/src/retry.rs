//! Attempt budget and delay schedule shared by every retrying call site

use std::future::Future;
use std::time::Duration;

use kbook_config::{Backoff, RetryConfig};

/// How many times to try and how long to wait in between.
///
/// `max_attempts` counts the first try. There is no jitter and no overall
/// deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(
            kbook_config::DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(kbook_config::DEFAULT_RETRY_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.delay_ms),
            backoff: config.backoff,
        }
    }

    /// Attempt budget, never less than one
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after `attempt` (1-based) failed
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Run `op` until it succeeds or the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the error from the final attempt.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_observed(op, |_, _| {}).await
    }

    /// Like [`RetryPolicy::run`], calling `on_failure` after every failed attempt
    /// (including the last) before any delay.
    ///
    /// # Errors
    ///
    /// Returns the error from the final attempt.
    pub async fn run_observed<T, E, F, Fut, O>(&self, mut op: F, mut on_failure: O) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        O: FnMut(u32, &E),
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    on_failure(attempt, &err);
                    if attempt >= attempts {
                        return Err(err);
                    }
                    tokio::time::sleep(self.delay_after(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}
