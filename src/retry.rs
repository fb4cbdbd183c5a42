//! Bounded retry
//!
//! Applied at exactly two layers: the whole per-identifier pipeline and a
//! single asset download. Everything below those layers degrades in place.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// Delay shape between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Always wait `base_delay`
    Constant,
    /// Wait `base_delay * 2^(n-1)`, capped at `max_delay`
    Exponential,
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomize each delay in `[0, delay]`
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Constant,
            base_delay: delay,
            max_delay: delay,
            jitter: false,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential,
            base_delay,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }

    /// A single attempt, no waiting
    pub fn none() -> Self {
        Self::constant(1, Duration::ZERO)
    }

    /// Delay to sleep after the failed `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        };

        if self.jitter && !delay.is_zero() {
            let millis = delay.as_millis().min(u64::MAX as u128) as u64;
            Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
        } else {
            delay
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let delay = self.delay_after(attempt);
                        tracing::warn!(
                            "{} failed (attempt {}/{}), retrying in {:?}: {}",
                            label,
                            attempt,
                            attempts,
                            delay,
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(Error::RetryExhausted {
            attempts,
            last_error,
        })
    }
}
