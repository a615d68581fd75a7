// src/retry.rs
//! Shared bounded-backoff loop. Every remote call site classifies its own
//! response into an [`Attempt`]; the loop itself never inspects error types.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::ApiError;

/// Outcome of a single remote attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    Retry(ApiError),
    Fatal(ApiError),
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub attempts: u32,
    pub initial: Duration,
    pub ceiling: Duration,
}

impl Backoff {
    /// Five attempts, exponential growth from 1s capped at 20s.
    pub const fn standard() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_secs(1),
            ceiling: Duration::from_secs(20),
        }
    }

    /// Delay before the attempt following `attempt` (1-based), with a
    /// uniform jitter of up to one `initial` added on top.
    fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self.initial.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
        let capped = exp.min(self.ceiling.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.0..=self.initial.as_secs_f64());
        Duration::from_secs_f64(capped + jitter)
    }
}

/// Run `op` until it reports `Done` or `Fatal`, sleeping between `Retry`
/// outcomes. The final failure is returned to the caller untouched.
pub async fn with_backoff<T, F, Fut>(policy: Backoff, label: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Attempt::Done(v) => return Ok(v),
            Attempt::Fatal(e) => return Err(e),
            Attempt::Retry(e) => {
                if attempt >= policy.attempts {
                    return Err(e);
                }
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    op = label,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "retryable failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// First 200 chars of a response body, for log lines.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> Backoff {
        Backoff {
            attempts: 5,
            initial: Duration::from_millis(1),
            ceiling: Duration::from_millis(4),
        }
    }

    #[test]
    fn delay_grows_and_caps_at_ceiling() {
        let b = Backoff {
            attempts: 5,
            initial: Duration::from_secs(1),
            ceiling: Duration::from_secs(20),
        };
        // jitter adds at most one `initial` on top of the capped exponential
        assert!(b.delay_after(1) <= Duration::from_secs(2));
        assert!(b.delay_after(5) >= Duration::from_secs(16));
        assert!(b.delay_after(10) <= Duration::from_secs(21));
    }

    #[tokio::test]
    async fn retries_until_done() {
        let calls = AtomicU32::new(0);
        let out = with_backoff(fast(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Attempt::Retry(ApiError::Server(500))
                } else {
                    Attempt::Done("ok")
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_short_circuits() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_backoff(fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Fatal(ApiError::Client(404)) }
        })
        .await;
        assert!(matches!(out, Err(ApiError::Client(404))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let out: Result<(), _> = with_backoff(fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Retry(ApiError::Server(503)) }
        })
        .await;
        assert!(matches!(out, Err(ApiError::Server(503))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
