//! Shared retry policy for the three network call sites.
//!
//! The embedding gateway, chat client, and crawler all retry the same
//! way: transient failures (connection errors, HTTP 429 and 5xx) back
//! off exponentially up to a bounded attempt count; non-transient
//! failures (other 4xx, malformed responses) fail immediately. Both the
//! backoff sleeps and the in-flight attempt race against the run's
//! [`CancelToken`] so an interrupt never waits out a request timeout.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Cooperative cancellation flag shared between the Ctrl-C handler and
/// the pipeline. Cheap to clone.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register for the wakeup before checking the flag, so a
            // cancel between the check and the await is not lost.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How one attempt of a retried operation failed.
#[derive(Debug)]
pub enum RetryError {
    /// Worth another attempt: connection failure, timeout, 429, 5xx.
    Transient(Error),
    /// Not worth retrying: other 4xx, malformed response body.
    Fatal(Error),
}

/// Bounded-attempt exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ...
    /// capped at 2^5.
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }

    /// Run `op` until it succeeds, fails fatally, exhausts the retry
    /// budget, or the token is cancelled.
    pub async fn run<T, Fut>(
        &self,
        cancel: &CancelToken,
        mut op: impl FnMut() -> Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, RetryError>>,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                tracing::debug!(attempt, ?delay, "retrying after backoff");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = tokio::select! {
                result = op() => result,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(RetryError::Transient(e)) => {
                    tracing::warn!(attempt, error = %e, "transient failure");
                    last_err = Some(e);
                }
                Err(RetryError::Fatal(e)) => return Err(e),
            }
        }

        Err(last_err.unwrap_or(Error::Cancelled))
    }
}

/// Whether an HTTP status is worth retrying: rate limits and server
/// errors only.
pub fn retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}
