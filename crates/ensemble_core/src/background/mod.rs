//! Synchronous and asynchronous execution of store calls.
//!
//! Foreground calls run inline through the retry loop. Background calls are
//! queued to a [`BackgroundProcessor`], which issues the raw async store call,
//! retries connection-class failures on its own thread, and turns the final
//! outcome into exactly one [`Event`] delivered on a [`CallbackExecutor`].

mod event;
mod executor;
mod mode;
mod processor;

pub use event::{Context, Event, EventType};
pub use executor::{CallbackExecutor, DeliveryThread, InlineExecutor, Task, DELIVERY_THREAD_NAME};
pub use mode::{
    BackgroundCallback, Backgrounding, CallbackError, Submission, UnhandledErrorListener,
};
pub use processor::{BackgroundProcessor, Payload, QueuedOperation, PROCESSOR_THREAD_NAME};

pub(crate) use processor::Listeners;
