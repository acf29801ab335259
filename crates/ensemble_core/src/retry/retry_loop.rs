use super::policy::RetryPolicy;
use crate::error::{CoreError, CoreResult};
use ensemble_store::{StoreError, StoreResult};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Performs the wait between attempts.
pub trait RetrySleeper: fmt::Debug + Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep_for(&self, duration: Duration);
}

/// Sleeps with [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl RetrySleeper for ThreadSleeper {
    fn sleep_for(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Returns the delay before the next attempt, or `None` to give up.
///
/// Errors the policy does not consider retryable always give up.
pub fn next_delay(
    policy: &dyn RetryPolicy,
    retry_count: u32,
    elapsed: Duration,
    error: &StoreError,
) -> Option<Duration> {
    if !policy.retries_on(error) {
        return None;
    }
    policy.allow_retry(retry_count, elapsed, error).delay()
}

/// Runs a store call until it succeeds, fails fatally, or the policy gives up.
pub struct RetryLoop<'a> {
    policy: &'a dyn RetryPolicy,
    sleeper: &'a dyn RetrySleeper,
    retry_count: u32,
    started: Option<Instant>,
}

impl<'a> RetryLoop<'a> {
    /// Creates a loop. The elapsed-time clock starts at the first attempt.
    pub fn new(policy: &'a dyn RetryPolicy, sleeper: &'a dyn RetrySleeper) -> Self {
        Self {
            policy,
            sleeper,
            retry_count: 0,
            started: None,
        }
    }

    /// Number of retries performed so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Time since the first attempt, zero before it.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Calls `attempt` until it succeeds or the loop gives up.
    ///
    /// `attempt` receives the zero-based attempt number, so callers can tell
    /// a first try from a repeat of a call whose outcome is unknown.
    pub fn run<T, F>(&mut self, operation: &str, mut attempt: F) -> CoreResult<T>
    where
        F: FnMut(u32) -> StoreResult<T>,
    {
        self.started.get_or_insert_with(Instant::now);
        loop {
            let err = match attempt(self.retry_count) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.policy.retries_on(&err) {
                return Err(CoreError::Store(err));
            }

            let elapsed = self.elapsed();
            match next_delay(self.policy, self.retry_count, elapsed, &err) {
                Some(delay) => {
                    debug!(
                        operation,
                        retry = self.retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying store call"
                    );
                    self.sleeper.sleep_for(delay);
                    self.retry_count += 1;
                }
                None => {
                    let attempts = self.retry_count + 1;
                    warn!(operation, attempts, ?elapsed, error = %err, "retry budget exhausted");
                    return Err(CoreError::RetriesExhausted {
                        attempts,
                        elapsed,
                        source: err,
                    });
                }
            }
        }
    }

    /// Convenience wrapper around [`RetryLoop::run`] for a single call.
    pub fn call_with_retry<T, F>(
        policy: &dyn RetryPolicy,
        sleeper: &dyn RetrySleeper,
        operation: &str,
        attempt: F,
    ) -> CoreResult<T>
    where
        F: FnMut(u32) -> StoreResult<T>,
    {
        RetryLoop::new(policy, sleeper).run(operation, attempt)
    }
}
