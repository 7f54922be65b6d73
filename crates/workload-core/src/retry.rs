use std::future::Future;

use crate::config::RetryConfig;
use crate::error::StoreError;

/// Why a conflict-retried write finally gave up.
#[derive(Debug)]
pub enum RetryError {
    /// Every attempt hit a conflicting concurrent write.
    Exhausted { attempts: u32, last: StoreError },
    /// A non-conflict error; never retried.
    Failed(StoreError),
}

/// Run a read-modify-write cycle, re-running it from the read whenever the
/// write reports a conflict.
///
/// `op` is called once per attempt and must perform the whole
/// fetch-transform-write sequence. Between attempts the task sleeps for
/// `config.backoff()`.
pub async fn retry_on_conflict<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() => {
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                tracing::debug!(attempt, error = %e, "write conflict, retrying");
                tokio::time::sleep(config.backoff()).await;
                attempt += 1;
            }
            Err(e) => return Err(RetryError::Failed(e)),
        }
    }
}
