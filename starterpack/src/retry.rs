use crate::error::{Result, StarterPackError};
use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts for transient failures, including the first one.
    pub max_attempts: u32,
    /// Unit of the exponential term: attempt `k` waits `base * 2^k + buffer`.
    pub base: Duration,
    pub buffer: Duration,
    /// Added on top of every provider-requested rate-limit wait.
    pub rate_limit_buffer: Duration,
    /// Consecutive rate-limit waits honored before giving up on the request.
    pub max_rate_limit_waits: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            buffer: Duration::from_secs(1),
            rate_limit_buffer: Duration::from_secs(1),
            max_rate_limit_waits: 5,
        }
    }
}

impl RetryConfig {
    /// Build the transient-failure schedule for one request.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: self.base,
            buffer: self.buffer,
            max_attempts: self.max_attempts.max(1),
            attempt: 0,
        }
    }
}

/// `2^attempt + buffer` schedule, bounded by the attempt budget.
///
/// Rate-limit waits bypass this schedule entirely (`backoff::Error::retry_after`),
/// so they never draw from the budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: Duration,
    buffer: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff for RetryPolicy {
    fn reset(&mut self) {
        self.attempt = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt + 1 >= self.max_attempts {
            return None;
        }
        let delay = self.base * 2u32.saturating_pow(self.attempt) + self.buffer;
        self.attempt += 1;
        Some(delay)
    }
}

/// Execute an async operation with retry logic.
///
/// Transient errors are retried on the [`RetryPolicy`] schedule,
/// [`StarterPackError::RateLimited`] waits out the provider's window, and
/// anything else fails immediately.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = AtomicU32::new(0);
    let rate_limit_waits = AtomicU32::new(0);
    let attempts = &attempts;
    let rate_limit_waits = &rate_limit_waits;

    retry_notify(
        config.policy(),
        || {
            let op = operation();

            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match op.await {
                    Ok(result) => {
                        if attempt > 1 {
                            info!("{} succeeded on attempt {}", operation_name, attempt);
                        }
                        Ok(result)
                    }
                    Err(StarterPackError::RateLimited { repo, wait_secs }) => {
                        let waits = rate_limit_waits.fetch_add(1, Ordering::SeqCst) + 1;
                        let err = StarterPackError::RateLimited { repo, wait_secs };
                        if waits > config.max_rate_limit_waits {
                            warn!(
                                "{} still rate limited after {} waits, giving up",
                                operation_name, config.max_rate_limit_waits
                            );
                            Err(backoff::Error::permanent(err))
                        } else {
                            let wait = Duration::from_secs(wait_secs) + config.rate_limit_buffer;
                            Err(backoff::Error::retry_after(err, wait))
                        }
                    }
                    Err(e) if e.is_transient() => {
                        rate_limit_waits.store(0, Ordering::SeqCst);
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        },
        |err: StarterPackError, wait: Duration| {
            warn!(
                "{} failed: {}. Retrying in {}s...",
                operation_name,
                err,
                wait.as_secs()
            );
        },
    )
    .await
    .inspect_err(|e| {
        warn!(
            "{} failed after {} attempts: {}",
            operation_name,
            attempts.load(Ordering::SeqCst),
            e
        );
    })
}
