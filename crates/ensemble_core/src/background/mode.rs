use super::event::{Context, Event};
use super::executor::CallbackExecutor;
use crate::error::CoreError;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Error a callback may return.
pub type CallbackError = Box<dyn Error + Send + Sync>;

/// Receives the event for a background call.
pub trait BackgroundCallback: Send + Sync {
    /// Handles the outcome. Errors are routed to the unhandled-error listener.
    fn process_result(&self, event: &Event) -> Result<(), CallbackError>;
}

impl<F> BackgroundCallback for F
where
    F: Fn(&Event) -> Result<(), CallbackError> + Send + Sync,
{
    fn process_result(&self, event: &Event) -> Result<(), CallbackError> {
        self(event)
    }
}

/// Receives errors nothing else handled.
pub trait UnhandledErrorListener: Send + Sync {
    /// Called with a description and the error.
    fn unhandled_error(&self, message: &str, error: &CoreError);
}

impl<F> UnhandledErrorListener for F
where
    F: Fn(&str, &CoreError) + Send + Sync,
{
    fn unhandled_error(&self, message: &str, error: &CoreError) {
        self(message, error)
    }
}

/// Outcome of submitting a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<T> {
    /// The call ran in the foreground.
    Completed(T),
    /// The call was queued; its result arrives as an event.
    Queued,
}

impl<T> Submission<T> {
    /// Returns the foreground result, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Submission::Completed(value) => Some(value),
            Submission::Queued => None,
        }
    }

    /// Returns true if the call was queued.
    pub fn is_queued(&self) -> bool {
        matches!(self, Submission::Queued)
    }
}

/// How a call is executed: inline with retries, or queued with a callback.
#[derive(Clone, Default)]
pub struct Backgrounding {
    in_background: bool,
    callback: Option<Arc<dyn BackgroundCallback>>,
    context: Option<Context>,
    executor: Option<Arc<dyn CallbackExecutor>>,
    error_listener: Option<Arc<dyn UnhandledErrorListener>>,
}

impl Backgrounding {
    /// Run on the calling thread.
    pub fn foreground() -> Self {
        Self::default()
    }

    /// Queue the call. Without a callback the event goes to the client's
    /// event listeners.
    pub fn background() -> Self {
        Self {
            in_background: true,
            ..Self::default()
        }
    }

    /// Switches between foreground and background execution.
    pub fn with_background(mut self, in_background: bool) -> Self {
        self.in_background = in_background;
        self
    }

    /// Sets the callback. Implies background execution.
    pub fn with_callback(mut self, callback: impl BackgroundCallback + 'static) -> Self {
        self.in_background = true;
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Sets a shared callback. Implies background execution.
    pub fn with_shared_callback(mut self, callback: Arc<dyn BackgroundCallback>) -> Self {
        self.in_background = true;
        self.callback = Some(callback);
        self
    }

    /// Sets the context value echoed on the event.
    pub fn with_context<T: Any + Send + Sync>(mut self, context: T) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    /// Sets the executor the callback runs on.
    pub fn with_executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the listener for errors escaping the callback.
    pub fn with_error_listener(mut self, listener: impl UnhandledErrorListener + 'static) -> Self {
        self.error_listener = Some(Arc::new(listener));
        self
    }

    /// Returns true if the call is queued.
    pub fn in_background(&self) -> bool {
        self.in_background
    }

    pub(crate) fn callback(&self) -> Option<&Arc<dyn BackgroundCallback>> {
        self.callback.as_ref()
    }

    pub(crate) fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub(crate) fn executor(&self) -> Option<&Arc<dyn CallbackExecutor>> {
        self.executor.as_ref()
    }

    pub(crate) fn error_listener(&self) -> Option<&Arc<dyn UnhandledErrorListener>> {
        self.error_listener.as_ref()
    }
}

impl fmt::Debug for Backgrounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backgrounding")
            .field("in_background", &self.in_background)
            .field("has_callback", &self.callback.is_some())
            .field("has_context", &self.context.is_some())
            .field("has_executor", &self.executor.is_some())
            .field("has_error_listener", &self.error_listener.is_some())
            .finish()
    }
}
