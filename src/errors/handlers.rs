use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use super::LedgerResult;

/// Bounded retry for operations that may hit a retryable store conflict.
///
/// `max_retries` counts the attempts made after the first one, so an
/// operation runs at most `max_retries + 1` times. Errors that are not
/// retryable are returned immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Duration::from_millis(2),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(result) => {
                    if retries > 0 {
                        info!(retries, "Operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        error = %e,
                        retry_count = retries,
                        max_retries = self.max_retries,
                        "Operation conflicted, retrying"
                    );
                    tokio::time::sleep(self.backoff * retries).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(error = %e, retries, "Maximum retries reached, operation failed");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
