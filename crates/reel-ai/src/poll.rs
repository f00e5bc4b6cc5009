//! Polling of asynchronous remote jobs.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{AiError, AiResult};

/// State reported by one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Pending,
    Done(T),
}

/// Call `check` until it reports `Done`, sleeping `interval` between calls.
///
/// Errors from `check` end the loop immediately. With `max_attempts` set,
/// a job still pending after that many checks yields `PollExhausted`.
pub async fn poll_until_done<T, F, Fut>(
    service: &'static str,
    interval: Duration,
    max_attempts: Option<u32>,
    mut check: F,
) -> AiResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AiResult<PollStatus<T>>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if let PollStatus::Done(value) = check(attempt).await? {
            return Ok(value);
        }
        if max_attempts.is_some_and(|max| attempt >= max) {
            return Err(AiError::PollExhausted {
                service,
                attempts: attempt,
            });
        }
        debug!(service, attempt, "Job pending, polling again in {:?}", interval);
        tokio::time::sleep(interval).await;
    }
}
