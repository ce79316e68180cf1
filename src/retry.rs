//! Retry policy for single GitHub calls.
//!
//! Every attempt reports a [`CallOutcome`]. Throttled attempts are retried up
//! to the configured bound, sleeping until the rate limit resets when the
//! remaining budget has fallen to the reserved threshold. Anything else that
//! fails is returned immediately.

use crate::error::{CallError, Error};
use chrono::{DateTime, Utc};
use log::warn;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RESERVED_THRESHOLD: u32 = 50;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Rate-limit budget reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl fmt::Display for RateLimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate limited ({} remaining, resets at {})",
            self.remaining,
            self.reset_at.to_rfc3339()
        )
    }
}

/// Result of one attempt against the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    Success(T),
    RateLimited(RateLimitStatus),
    Fatal(CallError),
}

impl<T> CallOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
        match self {
            CallOutcome::Success(v) => CallOutcome::Success(f(v)),
            CallOutcome::RateLimited(s) => CallOutcome::RateLimited(s),
            CallOutcome::Fatal(e) => CallOutcome::Fatal(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Remaining-call count at or below which throttled attempts wait for reset.
    pub reserved_threshold: u32,
    /// Added to the reset time to absorb clock skew with the remote service.
    pub grace_period: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reserved_threshold: DEFAULT_RESERVED_THRESHOLD,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl RetryPolicy {
    /// How long to wait before the next attempt, if at all.
    ///
    /// A reset time far enough in the past yields no wait even when the budget
    /// is exhausted.
    pub fn reset_wait(&self, status: &RateLimitStatus, now: DateTime<Utc>) -> Option<Duration> {
        if status.remaining > self.reserved_threshold {
            return None;
        }
        let grace_ms = i64::try_from(self.grace_period.as_millis()).unwrap_or(i64::MAX);
        let wait_ms = (status.reset_at - now)
            .num_milliseconds()
            .saturating_add(grace_ms);
        if wait_ms <= 0 {
            return None;
        }
        Some(Duration::from_millis(wait_ms as u64))
    }
}

/// Source of wall-clock time for computing rate-limit waits.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            clock: Arc::new(SystemClock),
            cancel: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) fn check_cancelled(&self, description: &str) -> Result<(), Error> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled {
                description: description.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Run `attempt` until it succeeds, fails fatally, or has been tried
    /// `max_attempts + 1` times.
    pub async fn execute<T, F, Fut>(
        &self,
        description: &str,
        max_attempts: u32,
        mut attempt: F,
    ) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let mut attempts: u32 = 0;
        loop {
            self.check_cancelled(description)?;
            attempts += 1;
            let status = match attempt().await {
                CallOutcome::Success(value) => return Ok(value),
                CallOutcome::Fatal(source) => {
                    return Err(Error::Fatal {
                        description: description.to_string(),
                        source,
                    })
                }
                CallOutcome::RateLimited(status) => status,
            };
            if attempts > max_attempts {
                return Err(Error::RetriesExhausted {
                    description: description.to_string(),
                    attempts,
                    last: status,
                });
            }
            self.wait_for_reset(description, &status).await?;
            warn!("error {}: {}. Will retry.", description, status);
        }
    }

    async fn wait_for_reset(&self, description: &str, status: &RateLimitStatus) -> Result<(), Error> {
        let Some(wait) = self.policy.reset_wait(status, self.clock.now()) else {
            return Ok(());
        };
        warn!(
            "--Rate Limiting-- GitHub tokens reached minimum reserve {}. Sleeping {}s until reset.",
            self.policy.reserved_threshold,
            wait.as_secs()
        );
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(Error::Cancelled {
                        description: description.to_string(),
                    }),
                    _ = tokio::time::sleep(wait) => Ok(()),
                }
            }
            None => {
                tokio::time::sleep(wait).await;
                Ok(())
            }
        }
    }
}

/// Retry `attempt` with the default policy.
pub async fn retry<T, F, Fut>(description: &str, max_attempts: u32, attempt: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CallOutcome<T>>,
{
    RetryExecutor::default()
        .execute(description, max_attempts, attempt)
        .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub(crate) struct FixedClock(pub DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    pub(crate) fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn executor() -> RetryExecutor {
        RetryExecutor::default().with_clock(Arc::new(FixedClock(epoch())))
    }

    fn throttled(remaining: u32, reset_in_secs: i64) -> RateLimitStatus {
        RateLimitStatus {
            remaining,
            reset_at: epoch() + chrono::Duration::seconds(reset_in_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_rate_limited_is_tried_max_plus_one_times() {
        for n in [0u32, 1, 3, 5] {
            let calls = AtomicU32::new(0);
            let res: Result<(), Error> = executor()
                .execute("listing things", n, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { CallOutcome::RateLimited(throttled(4000, 60)) }
                })
                .await;
            assert_eq!(calls.load(Ordering::SeqCst), n + 1);
            match res {
                Err(Error::RetriesExhausted {
                    description,
                    attempts,
                    ..
                }) => {
                    assert_eq!(description, "listing things");
                    assert_eq!(attempts, n + 1);
                }
                other => panic!("expected RetriesExhausted, got {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_is_never_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), Error> = executor()
            .execute("getting comment", 5, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { CallOutcome::Fatal(CallError::new("not_found", "Not Found")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = res.unwrap_err();
        assert_eq!(err.call_error().unwrap().code, "not_found");
        assert!(err.to_string().contains("getting comment"));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_throttling_returns_payload() {
        let calls = AtomicU32::new(0);
        let res = executor()
            .execute("getting user", 5, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        CallOutcome::RateLimited(throttled(4000, 60))
                    } else {
                        CallOutcome::Success("octocat")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(res, "octocat");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_until_reset_plus_grace_when_at_reserve() {
        let start = tokio::time::Instant::now();
        let seen = std::sync::Mutex::new(Vec::new());
        let res = executor()
            .execute("creating issue", 1, || {
                let mut seen = seen.lock().unwrap();
                seen.push(start.elapsed());
                let first = seen.len() == 1;
                async move {
                    if first {
                        CallOutcome::RateLimited(throttled(DEFAULT_RESERVED_THRESHOLD, 2))
                    } else {
                        CallOutcome::Success(())
                    }
                }
            })
            .await;
        assert!(res.is_ok());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Duration::ZERO);
        assert!(seen[1] >= Duration::from_secs(12));
        assert!(seen[1] < Duration::from_secs(12) + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn above_reserve_retries_immediately() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let _: Result<(), Error> = executor()
            .execute("editing comment", 2, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { CallOutcome::RateLimited(throttled(DEFAULT_RESERVED_THRESHOLD + 1, 3600)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_in_the_past_does_not_block() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let _: Result<(), Error> = executor()
            .execute("listing repos", 1, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { CallOutcome::RateLimited(throttled(0, -3600)) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn reset_wait_boundaries() {
        let policy = RetryPolicy::default();
        let now = epoch();
        // Reset a few seconds ago still leaves part of the grace period.
        assert_eq!(
            policy.reset_wait(&throttled(0, -4), now),
            Some(Duration::from_secs(6))
        );
        assert_eq!(policy.reset_wait(&throttled(0, -10), now), None);
        assert_eq!(policy.reset_wait(&throttled(51, 30), now), None);
        assert_eq!(
            policy.reset_wait(&throttled(50, 30), now),
            Some(Duration::from_secs(40))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_rate_limit_wait() {
        let token = CancellationToken::new();
        let exec = executor().with_cancellation(token.clone());
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                token.cancel();
            })
        };
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let res: Result<(), Error> = exec
            .execute("listing issues", 5, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { CallOutcome::RateLimited(throttled(0, 3600)) }
            })
            .await;
        canceller.await.unwrap();
        assert!(res.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn cancelled_token_prevents_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);
        let res: Result<(), Error> = executor()
            .with_cancellation(token)
            .execute("getting user", 5, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { CallOutcome::Success(()) }
            })
            .await;
        assert!(matches!(res, Err(Error::Cancelled { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
