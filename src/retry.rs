//! Retry utilities with exponential backoff and jitter.
//!
//! Two flavors are provided: [`retry_with_backoff`] retries a whole async
//! operation in place and is used for idempotent HTTP GETs, while [`Backoff`]
//! hands out successive delays to callers that must rebuild state between
//! attempts (the topology store re-fetches a baseline before every retry).

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Only errors for which `is_transient` returns true are retried; any other
/// error is returned to the caller immediately. Jitter (0.5x to 1.5x of the
/// current delay) avoids thundering-herd effects when many agents recover at
/// the same time.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_transient(&e) {
                    return Err(e);
                }

                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let jittered_delay = jitter(delay);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Policy for a budgeted exponential backoff.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Wall-clock budget; once spent, no further delays are handed out
    pub max_elapsed: Duration,
    /// Multiplier applied after every delay
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Stateful exponential backoff with jitter and a wall-clock budget.
///
/// Unlike [`retry_with_backoff`] this does not drive the operation itself;
/// callers ask for the next delay and sleep on their own, which lets them
/// rebuild state between attempts.
#[derive(Debug)]
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    deadline: Instant,
}

impl Backoff {
    /// Start a new backoff sequence; the elapsed budget starts counting now.
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            deadline: Instant::now() + config.max_elapsed,
        }
    }

    /// Next jittered delay, or `None` once the elapsed budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if Instant::now() >= self.deadline {
            return None;
        }

        let jittered = jitter(self.delay);
        self.delay = Duration::from_secs_f64(
            (self.delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        );
        Some(jittered)
    }
}

/// Apply 0.5x to 1.5x jitter to a delay.
fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let config = RetryConfig::with_max_attempts(3);
        let result: Result<i32, &str> =
            retry_with_backoff(&config, "op", |_| true, || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };

        let result: Result<i32, &str> = retry_with_backoff(&config, "op", |_| true, || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("fail")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };

        let result: Result<i32, &str> = retry_with_backoff(&config, "op", |_| true, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("always fails")
            }
        })
        .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_short_circuits() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let config = RetryConfig::with_max_attempts(5);

        let result: Result<i32, &str> =
            retry_with_backoff(&config, "op", |e: &&str| *e != "fatal", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                }
            })
            .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delays_grow_and_cap() {
        let mut backoff = Backoff::new(&BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            max_elapsed: Duration::from_secs(60),
            multiplier: 2.0,
        });

        // Jitter is 0.5x..1.5x, so bound-check instead of comparing exact values.
        let first = backoff.next_delay().unwrap();
        assert!(first >= Duration::from_millis(50) && first < Duration::from_millis(150));

        let second = backoff.next_delay().unwrap();
        assert!(second >= Duration::from_millis(100) && second < Duration::from_millis(300));

        // From here the raw delay is capped at 300ms.
        for _ in 0..10 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= Duration::from_millis(150) && delay < Duration::from_millis(450));
        }
    }

    #[test]
    fn test_backoff_stops_after_elapsed_budget() {
        let mut backoff = Backoff::new(&BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            max_elapsed: Duration::from_millis(20),
            multiplier: 2.0,
        });

        assert!(backoff.next_delay().is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(backoff.next_delay().is_none());
    }
}
