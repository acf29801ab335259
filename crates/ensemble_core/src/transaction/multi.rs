use super::op::TransactionOp;
use super::result::TransactionResult;
use crate::background::{
    BackgroundCallback, Backgrounding, CallbackExecutor, Submission, UnhandledErrorListener,
};
use crate::error::CoreResult;
use crate::framework::Framework;
use std::any::Any;
use std::sync::Arc;

/// Builder for one transaction submission.
///
/// ```no_run
/// # use ensemble_core::{Framework, TransactionOp};
/// # fn demo(framework: &Framework) -> ensemble_core::CoreResult<()> {
/// let results = framework
///     .transaction()
///     .for_operations([
///         TransactionOp::create("/jobs/1").with_data("queued").build(),
///         TransactionOp::set_data("/jobs", "1").build(),
///     ])?
///     .completed()
///     .unwrap_or_default();
/// assert_eq!(results.len(), 2);
/// # Ok(())
/// # }
/// ```
#[must_use = "a transaction does nothing until for_operations is called"]
pub struct MultiTransaction<'a> {
    framework: &'a Framework,
    backgrounding: Backgrounding,
}

impl<'a> MultiTransaction<'a> {
    pub(crate) fn new(framework: &'a Framework) -> Self {
        Self {
            framework,
            backgrounding: Backgrounding::foreground(),
        }
    }

    /// Runs the transaction in the background; the event goes to the
    /// client's event listeners.
    pub fn in_background(mut self) -> Self {
        self.backgrounding = self.backgrounding.with_background(true);
        self
    }

    /// Runs the transaction in the background and delivers the event to
    /// `callback`.
    pub fn in_background_with(mut self, callback: impl BackgroundCallback + 'static) -> Self {
        self.backgrounding = self.backgrounding.with_callback(callback);
        self
    }

    /// Sets the context echoed on the event.
    pub fn with_context<T: Any + Send + Sync>(mut self, context: T) -> Self {
        self.backgrounding = self.backgrounding.with_context(context);
        self
    }

    /// Sets the executor the callback runs on.
    pub fn with_executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.backgrounding = self.backgrounding.with_executor(executor);
        self
    }

    /// Sets the listener for errors escaping the callback.
    pub fn with_unhandled_error_listener(
        mut self,
        listener: impl UnhandledErrorListener + 'static,
    ) -> Self {
        self.backgrounding = self.backgrounding.with_error_listener(listener);
        self
    }

    /// Replaces the execution mode wholesale.
    pub fn with_backgrounding(mut self, backgrounding: Backgrounding) -> Self {
        self.backgrounding = backgrounding;
        self
    }

    /// Validates and submits `ops` as one atomic batch.
    pub fn for_operations(
        self,
        ops: impl IntoIterator<Item = TransactionOp>,
    ) -> CoreResult<Submission<Vec<TransactionResult>>> {
        self.framework.submit(ops, &self.backgrounding)
    }
}
