//! Retry with backoff, decided by error kind.

use std::future::Future;
use std::time::Duration;

use crate::api::error::{log_error, ApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
  /// `base * 2^n`, capped
  Exponential,
  /// Always `base`
  Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first one
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  pub backoff: Backoff,
}

impl RetryPolicy {
  /// Policy for reads: 3 attempts, 1s doubling up to 30s.
  pub fn queries() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
      backoff: Backoff::Exponential,
    }
  }

  /// Policy for mutations: a single retry after 1s.
  pub fn mutations() -> Self {
    Self {
      max_attempts: 2,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(1),
      backoff: Backoff::Fixed,
    }
  }

  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      base_delay: Duration::ZERO,
      max_delay: Duration::ZERO,
      backoff: Backoff::Fixed,
    }
  }

  /// Delay before the retry that follows `failures` failed attempts.
  pub fn delay_for(&self, failures: u32) -> Duration {
    match self.backoff {
      Backoff::Fixed => self.base_delay.min(self.max_delay),
      Backoff::Exponential => {
        let exponent = failures.saturating_sub(1).min(31);
        self
          .base_delay
          .checked_mul(1u32 << exponent)
          .unwrap_or(self.max_delay)
          .min(self.max_delay)
      }
    }
  }

  /// Whether another attempt should follow `attempts` failed ones.
  pub fn should_retry(&self, attempts: u32, error: &ApiError) -> bool {
    attempts < self.max_attempts && error.is_retryable()
  }

  /// Run `operation` until it succeeds, fails terminally or runs out of
  /// attempts. The final error is logged under `context`.
  pub async fn run<T, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, ApiError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let mut attempts = 0;
    loop {
      attempts += 1;
      match operation().await {
        Ok(value) => return Ok(value),
        Err(err) if self.should_retry(attempts, &err) => {
          let delay = self.delay_for(attempts);
          tracing::debug!(
            context,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying"
          );
          tokio::time::sleep(delay).await;
        }
        Err(err) => {
          log_error(context, &err);
          return Err(err);
        }
      }
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::queries()
  }
}
