//! Retry with exponential backoff
//!
//! Shared by discovery fetches and executor handlers. Only errors classified
//! `Transient` are retried; everything else fails on the first attempt.
//! Backoff sleeps race the cancellation token, never a bare sleep.

use crate::cancel::CancelToken;
use crate::service::ServiceError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between retries.
    pub multiplier: f64,
    /// Apply full jitter (uniform in [0, delay]) to each sleep.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Deterministic variant for tests driven on virtual time.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Backoff delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.multiplier.powi(retry.saturating_sub(1) as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let seconds = if self.jitter {
            rand::thread_rng().gen_range(0.0..=capped)
        } else {
            capped
        };
        Duration::from_secs_f64(seconds)
    }
}

/// Why a retried call ultimately failed.
#[derive(Debug, Clone)]
pub enum RetryError {
    /// The last service error, after exhausting attempts or hitting a
    /// non-retryable classification.
    Service { error: ServiceError, attempts: u32 },
    /// Cancellation fired while waiting or between attempts.
    Cancelled { attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Service { attempts, .. } | RetryError::Cancelled { attempts } => *attempts,
        }
    }

    /// The underlying service error, if any.
    pub fn into_service_error(self) -> Option<ServiceError> {
        match self {
            RetryError::Service { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Service { error, attempts } => {
                write!(f, "{error} (after {attempts} attempt(s))")
            }
            RetryError::Cancelled { attempts } => {
                write!(f, "cancelled after {attempts} attempt(s)")
            }
        }
    }
}

/// Successful call plus how many attempts it took.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Retries beyond the first attempt.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `call` under the policy, retrying transient failures.
///
/// `what` labels log lines; it never carries secrets.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    what: &str,
    mut call: F,
) -> Result<RetryOutcome<T>, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempts = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts });
        }

        attempts += 1;
        match call().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(what, attempts, "call succeeded after retry");
                }
                return Ok(RetryOutcome { value, attempts });
            }
            Err(error) if error.is_retryable() && attempts < policy.max_attempts => {
                let delay = policy.delay_for(attempts);
                warn!(
                    what,
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(RetryError::Cancelled { attempts });
                    }
                }
            }
            Err(error) => {
                return Err(RetryError::Service { error, attempts });
            }
        }
    }
}
