//! Recording callbacks, listeners and sleepers.

use ensemble_core::background::{CallbackError, Event};
use ensemble_core::{BackgroundCallback, CoreError, RetrySleeper, UnhandledErrorListener};
use ensemble_store::ErrorCode;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default wait used by the recorders.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

struct Recorded<T> {
    items: Mutex<Vec<T>>,
    arrived: Condvar,
}

impl<T: Clone> Recorded<T> {
    fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
        }
    }

    fn push(&self, item: T) {
        self.items.lock().push(item);
        self.arrived.notify_all();
    }

    fn wait_for(&self, count: usize, timeout: Duration) -> Vec<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        while items.len() < count {
            if self.arrived.wait_until(&mut items, deadline).timed_out() {
                break;
            }
        }
        items.clone()
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

/// An event together with the thread it was delivered on.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// The delivered event.
    pub event: Event,
    /// Name of the delivering thread.
    pub thread_name: Option<String>,
}

/// Collects background events.
pub struct EventRecorder {
    events: Recorded<RecordedEvent>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Recorded::new(),
        })
    }

    /// A callback that records every event it receives.
    pub fn callback(self: &Arc<Self>) -> impl BackgroundCallback + 'static {
        let recorder = Arc::clone(self);
        move |event: &Event| -> Result<(), CallbackError> {
            recorder.record(event);
            Ok(())
        }
    }

    /// A callback that records the event, then fails with `message`.
    pub fn failing_callback(self: &Arc<Self>, message: &'static str) -> impl BackgroundCallback + 'static {
        let recorder = Arc::clone(self);
        move |event: &Event| -> Result<(), CallbackError> {
            recorder.record(event);
            Err(message.into())
        }
    }

    /// A callback that records the event, then panics with `message`.
    pub fn panicking_callback(self: &Arc<Self>, message: &'static str) -> impl BackgroundCallback + 'static {
        let recorder = Arc::clone(self);
        move |event: &Event| -> Result<(), CallbackError> {
            recorder.record(event);
            panic!("{message}");
        }
    }

    fn record(&self, event: &Event) {
        self.events.push(RecordedEvent {
            event: event.clone(),
            thread_name: thread::current().name().map(str::to_string),
        });
    }

    /// Waits until `count` events arrived or `timeout` passed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<RecordedEvent> {
        self.events.wait_for(count, timeout)
    }

    /// Waits for the first event.
    pub fn wait_one(&self) -> Option<RecordedEvent> {
        self.wait_for(1, WAIT_TIMEOUT).into_iter().next()
    }

    /// Events so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.snapshot()
    }

    /// Number of events so far.
    pub fn count(&self) -> usize {
        self.events.snapshot().len()
    }
}

/// An unhandled error as seen by a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    /// Description passed to the listener.
    pub message: String,
    /// Rendered error.
    pub error: String,
    /// Store code behind the error, if any.
    pub code: Option<ErrorCode>,
}

/// Collects unhandled errors.
pub struct ErrorRecorder {
    errors: Recorded<RecordedError>,
}

impl ErrorRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            errors: Recorded::new(),
        })
    }

    /// A listener that records every error it receives.
    pub fn listener(self: &Arc<Self>) -> impl UnhandledErrorListener + 'static {
        let recorder = Arc::clone(self);
        move |message: &str, error: &CoreError| {
            recorder.errors.push(RecordedError {
                message: message.to_string(),
                error: error.to_string(),
                code: error.code(),
            });
        }
    }

    /// Waits until `count` errors arrived or `timeout` passed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<RecordedError> {
        self.errors.wait_for(count, timeout)
    }

    /// Errors so far.
    pub fn errors(&self) -> Vec<RecordedError> {
        self.errors.snapshot()
    }
}

/// A sleeper that records requested delays without sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Delays requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl RetrySleeper for RecordingSleeper {
    fn sleep_for(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_times_out() {
        let recorder = EventRecorder::new();
        let events = recorder.wait_for(1, Duration::from_millis(10));
        assert!(events.is_empty());
    }

    #[test]
    fn error_listener_records() {
        let recorder = ErrorRecorder::new();
        let listener = recorder.listener();
        listener.unhandled_error("boom", &CoreError::ShuttingDown);
        let errors = recorder.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "boom");
        assert_eq!(errors[0].code, None);
    }

    #[test]
    fn sleeper_records() {
        let sleeper = RecordingSleeper::default();
        sleeper.sleep_for(Duration::from_millis(3));
        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(3)]);
    }
}
