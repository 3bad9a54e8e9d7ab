//! Retry combinator shared by the inbound dispatch path and the outbound
//! write path.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// One retryable unit of work.
pub trait Attempt: Send {
    type Output: Send;
    type Error: Display + Send;

    /// Runs the operation. `attempt` starts at 1.
    fn attempt(
        &mut self,
        attempt: u32,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Whether another attempt may help with `error`.
    fn is_retryable(&self, _error: &Self::Error) -> bool {
        true
    }
}

/// The last error of an operation that did not succeed.
#[derive(Debug)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
    /// `false` when the operation was abandoned because the error was final.
    pub retryable: bool,
}

/// How many times a failed operation is re-run, and how long to wait first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl RetryPolicy {
    /// A single immediate retry.
    pub const fn once() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::ZERO,
        }
    }

    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs `op` until it succeeds, fails with a final error, or the retry
    /// budget is spent. On success returns the value and the attempt count.
    pub async fn run<A: Attempt>(
        &self,
        op: &mut A,
    ) -> Result<(A::Output, u32), RetryError<A::Error>> {
        let mut attempt = 1;
        loop {
            match op.attempt(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(error) => {
                    let retryable = op.is_retryable(&error);
                    if !retryable || attempt > self.max_retries {
                        return Err(RetryError {
                            error,
                            attempts: attempt,
                            retryable,
                        });
                    }
                    debug!(attempt, %error, "Attempt failed, retrying.");
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
