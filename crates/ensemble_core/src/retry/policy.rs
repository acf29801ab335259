use ensemble_store::StoreError;
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Largest retry count for which `2^(retry + 1)` still fits in a `u32`.
const MAX_BACKOFF_RETRIES: u32 = 29;

/// What a policy decided after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then try again.
    RetryAfter(Duration),
    /// Stop and surface the last error.
    GiveUp,
}

impl RetryDecision {
    /// Returns the delay if the decision is to retry.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            RetryDecision::RetryAfter(delay) => Some(*delay),
            RetryDecision::GiveUp => None,
        }
    }
}

/// Decides whether a failed store call may be attempted again.
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    /// Called after a failed attempt.
    ///
    /// `retry_count` is the number of retries already performed (zero after
    /// the first failure) and `elapsed` is measured from the first attempt.
    fn allow_retry(&self, retry_count: u32, elapsed: Duration, error: &StoreError)
        -> RetryDecision;

    /// Returns true if `error` is of a class this policy will consider.
    fn retries_on(&self, error: &StoreError) -> bool {
        error.is_retryable()
    }
}

/// Retries up to `n` times with a fixed sleep.
#[derive(Debug, Clone)]
pub struct RetryNTimes {
    n: u32,
    sleep_between: Duration,
}

impl RetryNTimes {
    /// Creates the policy.
    pub fn new(n: u32, sleep_between: Duration) -> Self {
        Self { n, sleep_between }
    }
}

impl RetryPolicy for RetryNTimes {
    fn allow_retry(&self, retry_count: u32, _elapsed: Duration, _error: &StoreError) -> RetryDecision {
        if retry_count < self.n {
            RetryDecision::RetryAfter(self.sleep_between)
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Retries exactly once.
#[derive(Debug, Clone)]
pub struct RetryOneTime(RetryNTimes);

impl RetryOneTime {
    /// Creates the policy.
    pub fn new(sleep_between: Duration) -> Self {
        Self(RetryNTimes::new(1, sleep_between))
    }
}

impl RetryPolicy for RetryOneTime {
    fn allow_retry(&self, retry_count: u32, elapsed: Duration, error: &StoreError) -> RetryDecision {
        self.0.allow_retry(retry_count, elapsed, error)
    }
}

/// Retries without limit.
#[derive(Debug, Clone)]
pub struct RetryForever {
    sleep_between: Duration,
}

impl RetryForever {
    /// Creates the policy.
    pub fn new(sleep_between: Duration) -> Self {
        Self { sleep_between }
    }
}

impl RetryPolicy for RetryForever {
    fn allow_retry(&self, _retry_count: u32, _elapsed: Duration, _error: &StoreError) -> RetryDecision {
        RetryDecision::RetryAfter(self.sleep_between)
    }
}

/// Retries until a total time budget has been spent.
#[derive(Debug, Clone)]
pub struct RetryUntilElapsed {
    max_elapsed: Duration,
    sleep_between: Duration,
}

impl RetryUntilElapsed {
    /// Creates the policy.
    pub fn new(max_elapsed: Duration, sleep_between: Duration) -> Self {
        Self {
            max_elapsed,
            sleep_between,
        }
    }
}

impl RetryPolicy for RetryUntilElapsed {
    fn allow_retry(&self, _retry_count: u32, elapsed: Duration, _error: &StoreError) -> RetryDecision {
        if elapsed < self.max_elapsed {
            RetryDecision::RetryAfter(self.sleep_between)
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Retries a bounded number of times with randomized exponential backoff.
///
/// The sleep before retry `k` is `base_sleep * r` with `r` drawn uniformly
/// from `[1, 2^(k + 1))`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetry {
    base_sleep: Duration,
    max_retries: u32,
    max_sleep: Option<Duration>,
}

impl ExponentialBackoffRetry {
    /// Creates the policy. `max_retries` is clamped to 29.
    pub fn new(base_sleep: Duration, max_retries: u32) -> Self {
        Self {
            base_sleep,
            max_retries: max_retries.min(MAX_BACKOFF_RETRIES),
            max_sleep: None,
        }
    }

    /// Caps each individual sleep.
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = Some(max_sleep);
        self
    }

    /// Returns the configured retry limit.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn sleep_for(&self, retry_count: u32) -> Duration {
        let upper = 1u32 << (retry_count.min(MAX_BACKOFF_RETRIES) + 1);
        let factor = rand::thread_rng().gen_range(1..upper);
        let sleep = self.base_sleep.saturating_mul(factor);
        match self.max_sleep {
            Some(max) => sleep.min(max),
            None => sleep,
        }
    }
}

impl RetryPolicy for ExponentialBackoffRetry {
    fn allow_retry(&self, retry_count: u32, _elapsed: Duration, _error: &StoreError) -> RetryDecision {
        if retry_count < self.max_retries {
            RetryDecision::RetryAfter(self.sleep_for(retry_count))
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// [`ExponentialBackoffRetry`] with a mandatory cap on each sleep.
#[derive(Debug, Clone)]
pub struct BoundedExponentialBackoffRetry(ExponentialBackoffRetry);

impl BoundedExponentialBackoffRetry {
    /// Creates the policy.
    pub fn new(base_sleep: Duration, max_sleep: Duration, max_retries: u32) -> Self {
        Self(ExponentialBackoffRetry::new(base_sleep, max_retries).with_max_sleep(max_sleep))
    }
}

impl RetryPolicy for BoundedExponentialBackoffRetry {
    fn allow_retry(&self, retry_count: u32, elapsed: Duration, error: &StoreError) -> RetryDecision {
        self.0.allow_retry(retry_count, elapsed, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loss() -> StoreError {
        StoreError::connection_loss()
    }

    #[test]
    fn n_times_stops_after_n() {
        let policy = RetryNTimes::new(2, Duration::from_millis(5));
        let d = Duration::ZERO;
        assert_eq!(
            policy.allow_retry(0, d, &loss()),
            RetryDecision::RetryAfter(Duration::from_millis(5))
        );
        assert!(policy.allow_retry(1, d, &loss()).delay().is_some());
        assert_eq!(policy.allow_retry(2, d, &loss()), RetryDecision::GiveUp);
    }

    #[test]
    fn one_time() {
        let policy = RetryOneTime::new(Duration::ZERO);
        assert!(policy.allow_retry(0, Duration::ZERO, &loss()).delay().is_some());
        assert_eq!(policy.allow_retry(1, Duration::ZERO, &loss()), RetryDecision::GiveUp);
    }

    #[test]
    fn until_elapsed_uses_elapsed_time() {
        let policy = RetryUntilElapsed::new(Duration::from_secs(1), Duration::from_millis(1));
        assert!(policy
            .allow_retry(100, Duration::from_millis(999), &loss())
            .delay()
            .is_some());
        assert_eq!(
            policy.allow_retry(0, Duration::from_secs(1), &loss()),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn forever_never_gives_up() {
        let policy = RetryForever::new(Duration::from_millis(1));
        assert!(policy
            .allow_retry(u32::MAX, Duration::from_secs(3600), &loss())
            .delay()
            .is_some());
    }

    #[test]
    fn exponential_backoff_range() {
        let base = Duration::from_millis(10);
        let policy = ExponentialBackoffRetry::new(base, 5);
        for retry in 0..5 {
            for _ in 0..50 {
                let delay = policy.allow_retry(retry, Duration::ZERO, &loss()).delay().unwrap();
                assert!(delay >= base);
                assert!(delay < base * (1 << (retry + 1)));
            }
        }
        assert_eq!(policy.allow_retry(5, Duration::ZERO, &loss()), RetryDecision::GiveUp);
    }

    #[test]
    fn exponential_backoff_clamps_retries() {
        let policy = ExponentialBackoffRetry::new(Duration::from_millis(1), 100);
        assert_eq!(policy.max_retries(), 29);
    }

    #[test]
    fn bounded_backoff_caps_sleep() {
        let cap = Duration::from_millis(15);
        let policy = BoundedExponentialBackoffRetry::new(Duration::from_millis(10), cap, 10);
        for _ in 0..50 {
            let delay = policy.allow_retry(8, Duration::ZERO, &loss()).delay().unwrap();
            assert!(delay <= cap);
        }
    }

    #[test]
    fn only_retryable_errors_are_considered() {
        let policy = RetryForever::new(Duration::ZERO);
        assert!(policy.retries_on(&loss()));
        assert!(!policy.retries_on(&StoreError::code_only(
            ensemble_store::ErrorCode::SessionExpired
        )));
    }
}
