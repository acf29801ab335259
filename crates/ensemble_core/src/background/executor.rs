use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::mpsc::{self, Sender};
use std::thread;

/// Name of the framework-owned callback thread.
pub const DELIVERY_THREAD_NAME: &str = "ensemble-callbacks";

/// A unit of callback work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs callback deliveries.
pub trait CallbackExecutor: Send + Sync {
    /// Runs `task`, now or later, exactly once.
    fn execute(&self, task: Task);
}

/// Runs each task immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl CallbackExecutor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// A dedicated thread running tasks in submission order.
///
/// Dropping the executor lets the thread finish queued tasks and exit.
pub struct DeliveryThread {
    sender: Mutex<Option<Sender<Task>>>,
    name: String,
}

impl DeliveryThread {
    /// Spawns the thread.
    pub fn spawn(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Task>();
        thread::Builder::new().name(name.clone()).spawn(move || {
            while let Ok(task) = rx.recv() {
                task();
            }
        })?;
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            name,
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops accepting tasks. Already queued tasks still run.
    pub fn shutdown(&self) {
        self.sender.lock().take();
    }
}

impl CallbackExecutor for DeliveryThread {
    fn execute(&self, task: Task) {
        let undelivered = match self.sender.lock().as_ref() {
            Some(tx) => tx.send(task).err().map(|e| e.0),
            None => Some(task),
        };
        // Tasks carry exactly-once callbacks; never drop one.
        if let Some(task) = undelivered {
            task();
        }
    }
}

impl fmt::Debug for DeliveryThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryThread")
            .field("name", &self.name)
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}
