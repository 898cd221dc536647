//! Retry combinator.
//!
//! The combinator knows nothing about HTTP. It asks the error whether another
//! attempt is worthwhile, and sleeps through an injectable [`Sleeper`] so tests
//! can observe delays without waiting.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::resilience::backoff::RetryPolicy;

/// Errors that know whether retrying could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Final result plus how many attempts were made.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or the policy runs out.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) => {
                if attempt >= max_attempts || !e.is_retryable() {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }

                let delay = policy.delay(attempt);
                tracing::info!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    #[derive(Debug)]
    struct TestError {
        permanent: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (permanent: {})", self.permanent)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            !self.permanent
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let outcome = retry_with_backoff(&policy(), &sleeper, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(TestError { permanent: false })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sleeper = RecordingSleeper::default();
        let outcome: RetryOutcome<(), _> = retry_with_backoff(&policy(), &sleeper, |_| async {
            Err(TestError { permanent: false })
        })
        .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 3);
        // No sleep after the final attempt.
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_stops_early() {
        let sleeper = RecordingSleeper::default();
        let outcome: RetryOutcome<(), _> = retry_with_backoff(&policy(), &sleeper, |_| async {
            Err(TestError { permanent: true })
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }
}
