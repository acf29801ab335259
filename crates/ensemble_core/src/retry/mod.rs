//! Retry policies and the retry loop.
//!
//! Every store call made by the framework runs through [`RetryLoop`]. The
//! loop asks a [`RetryPolicy`] whether a failed attempt may be repeated and
//! how long to wait first; only connection-class errors are ever retried.

mod idempotent;
mod policy;
mod retry_loop;

pub use idempotent::idempotent_outcome;
pub use policy::{
    BoundedExponentialBackoffRetry, ExponentialBackoffRetry, RetryDecision, RetryForever,
    RetryNTimes, RetryOneTime, RetryPolicy, RetryUntilElapsed,
};
pub use retry_loop::{next_delay, RetryLoop, RetrySleeper, ThreadSleeper};
