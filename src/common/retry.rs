use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

/// Retry an operation while `should_retry` accepts the error.
///
/// `max_attempts` counts the first call; values below one behave as one.
/// The backoff receives the number of the attempt that just failed.
pub async fn with_retry_if<T, E, F, Fut, B, P>(
    operation: F,
    max_attempts: usize,
    log_context: &str,
    backoff_fn: B,
    should_retry: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    B: Fn(usize) -> Duration,
    P: Fn(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded after {} attempts", log_context, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts || !should_retry(&e) => {
                if attempt > 1 {
                    error!("{} failed after {} attempts: {}", log_context, attempt, e);
                }
                return Err(e);
            }
            Err(e) => {
                let delay = backoff_fn(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    log_context, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// base * 2^(attempt-1), optionally capped
pub fn exponential_backoff(
    base_ms: u64,
    max_ms: Option<u64>,
) -> impl Fn(usize) -> Duration + Send + Sync {
    move |attempt| {
        let exponent = attempt.saturating_sub(1).min(32) as u32;
        let delay = base_ms.saturating_mul(2u64.saturating_pow(exponent));
        match max_ms {
            Some(max) => Duration::from_millis(delay.min(max)),
            None => Duration::from_millis(delay),
        }
    }
}
