use super::event::{Event, EventType};
use super::executor::CallbackExecutor;
use super::mode::{BackgroundCallback, Backgrounding, UnhandledErrorListener};
use crate::ensure::EnsureContainers;
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::retry::{idempotent_outcome, next_delay, RetryPolicy};
use crate::transaction::{wrap_results, MultiTransactionRecord};
use ensemble_store::{ErrorCode, Op, OpResult, StoreClient, StoreError, StoreResult};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Name of the background processing thread.
pub const PROCESSOR_THREAD_NAME: &str = "ensemble-background";

/// What a queued operation submits.
#[derive(Debug, Clone)]
pub enum Payload {
    /// One request; `op` carries the namespaced path.
    Single {
        /// The store request.
        op: Op,
        /// Path as given by the caller.
        for_path: String,
    },
    /// A validated transaction.
    Transaction(MultiTransactionRecord),
}

/// A call waiting for, or undergoing, background execution.
#[derive(Debug)]
pub struct QueuedOperation {
    payload: Payload,
    backgrounding: Backgrounding,
    precomputed: Option<Event>,
    retry_count: u32,
    started: Option<Instant>,
}

impl QueuedOperation {
    /// Queues `payload` under `backgrounding`.
    pub fn new(payload: Payload, backgrounding: Backgrounding) -> Self {
        Self {
            payload,
            backgrounding,
            precomputed: None,
            retry_count: 0,
            started: None,
        }
    }

    /// Delivers `event` without contacting the store.
    pub fn with_precomputed(mut self, event: Event) -> Self {
        self.precomputed = Some(event);
        self
    }

    /// The payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Retries performed so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn event_type(&self) -> EventType {
        match &self.payload {
            Payload::Single { op, .. } => op.kind().into(),
            Payload::Transaction(_) => EventType::Transaction,
        }
    }

    fn event_path(&self) -> Option<String> {
        match &self.payload {
            Payload::Single { for_path, .. } => Some(for_path.clone()),
            Payload::Transaction(_) => None,
        }
    }

    fn error_event(&self, code: ErrorCode) -> Event {
        Event::new(self.event_type(), self.event_path()).with_code(code)
    }
}

enum RawOutcome {
    Single(StoreResult<OpResult>),
    Multi(StoreResult<Vec<OpResult>>),
}

impl RawOutcome {
    fn error(&self) -> Option<&StoreError> {
        match self {
            RawOutcome::Single(Err(err)) | RawOutcome::Multi(Err(err)) => Some(err),
            _ => None,
        }
    }
}

enum Message {
    Submit(QueuedOperation),
    Completed(QueuedOperation, RawOutcome),
    Shutdown,
}

/// Client-level listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    unhandled: RwLock<Vec<Arc<dyn UnhandledErrorListener>>>,
    events: RwLock<Vec<Arc<dyn BackgroundCallback>>>,
}

impl Listeners {
    pub(crate) fn add_unhandled(&self, listener: Arc<dyn UnhandledErrorListener>) {
        self.unhandled.write().push(listener);
    }

    pub(crate) fn add_event(&self, listener: Arc<dyn BackgroundCallback>) {
        self.events.write().push(listener);
    }

    /// Routes an error to the per-call listener, else the client listeners,
    /// else the log.
    pub(crate) fn report_unhandled(
        &self,
        per_call: Option<&Arc<dyn UnhandledErrorListener>>,
        message: &str,
        err: &CoreError,
    ) {
        let targets = match per_call {
            Some(listener) => vec![Arc::clone(listener)],
            None => self.unhandled.read().clone(),
        };
        if targets.is_empty() {
            error!(error = %err, "{message}");
            return;
        }
        for listener in targets {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                listener.unhandled_error(message, err)
            }));
            if outcome.is_err() {
                error!(error = %err, "unhandled-error listener panicked while handling: {message}");
            }
        }
    }

    fn dispatch_event(&self, event: &Event) {
        let listeners = self.events.read().clone();
        if listeners.is_empty() {
            debug!(?event, "background event with no callback or listener");
        }
        for listener in listeners {
            if let Err(err) = run_callback(listener.as_ref(), event) {
                self.report_unhandled(None, "event listener failed", &err);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

fn run_callback(callback: &dyn BackgroundCallback, event: &Event) -> CoreResult<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback.process_result(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(CoreError::callback_failed(err.to_string())),
        Err(payload) => Err(CoreError::callback_failed(format!(
            "panic: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

struct ProcessorShared {
    client: Arc<dyn StoreClient>,
    policy: Arc<dyn RetryPolicy>,
    namespace: Namespace,
    namespace_root: Option<Arc<EnsureContainers>>,
    default_executor: Arc<dyn CallbackExecutor>,
    listeners: Arc<Listeners>,
    gate: Mutex<Option<Sender<Message>>>,
}

impl ProcessorShared {
    fn perform(self: &Arc<Self>, mut queued: QueuedOperation) {
        if let Some(event) = queued.precomputed.take() {
            self.deliver(queued, event);
            return;
        }
        queued.started.get_or_insert_with(Instant::now);

        // One attempt per pass; retryable failures go through the delay queue
        // so the processor thread never sleeps.
        if let Some(root) = &self.namespace_root {
            match root.ensure_once() {
                Ok(()) => {}
                Err(CoreError::Store(err)) if err.is_retryable() => {
                    debug!(error = %err, retry = queued.retry_count, "namespace root not ready");
                    let outcome = match &queued.payload {
                        Payload::Single { .. } => RawOutcome::Single(Err(err)),
                        Payload::Transaction(_) => RawOutcome::Multi(Err(err)),
                    };
                    self.complete(queued, outcome);
                    return;
                }
                Err(err) => {
                    let code = err.code().unwrap_or(ErrorCode::RuntimeInconsistency);
                    warn!(error = %err, "could not create namespace root");
                    let event = queued.error_event(code);
                    self.deliver(queued, event);
                    return;
                }
            }
        }

        let shared = Arc::clone(self);
        match queued.payload.clone() {
            Payload::Single { op, .. } => {
                debug!(path = op.path(), retry = queued.retry_count, "submitting background call");
                self.client.submit_async(
                    op,
                    Box::new(move |result| shared.complete(queued, RawOutcome::Single(result))),
                );
            }
            Payload::Transaction(record) => {
                debug!(ops = record.len(), retry = queued.retry_count, "submitting background transaction");
                self.client.multi_async(
                    record.ops(),
                    Box::new(move |result| shared.complete(queued, RawOutcome::Multi(result))),
                );
            }
        }
    }

    /// Raw store completion; runs on the store's I/O thread.
    fn complete(&self, queued: QueuedOperation, outcome: RawOutcome) {
        let undelivered = match self.gate.lock().as_ref() {
            Some(tx) => tx.send(Message::Completed(queued, outcome)).err().map(|e| e.0),
            None => Some(Message::Completed(queued, outcome)),
        };
        if let Some(Message::Completed(queued, outcome)) = undelivered {
            self.finish(queued, outcome);
        }
    }

    fn retry_delay(&self, queued: &QueuedOperation, outcome: &RawOutcome) -> Option<Duration> {
        let err = outcome.error()?;
        let elapsed = queued.started.map(|s| s.elapsed()).unwrap_or_default();
        let delay = next_delay(self.policy.as_ref(), queued.retry_count, elapsed, err);
        if delay.is_none() && err.is_retryable() {
            warn!(retries = queued.retry_count, error = %err, "background retry budget exhausted");
        }
        delay
    }

    fn translate(&self, queued: &QueuedOperation, outcome: RawOutcome) -> CoreResult<Event> {
        let mut event = Event::new(queued.event_type(), queued.event_path());
        match (&queued.payload, outcome) {
            (Payload::Single { op, .. }, RawOutcome::Single(result)) => {
                let result = match result {
                    Err(err) if queued.retry_count > 0 => idempotent_outcome(op, &err).ok_or(err),
                    other => other,
                };
                match result {
                    Ok(OpResult::Create { path, stat }) => {
                        event.name = Some(self.namespace.unfix(&path));
                        event.stat = stat;
                    }
                    Ok(OpResult::SetData { stat }) => event.stat = Some(stat),
                    Ok(OpResult::Delete) | Ok(OpResult::Check) => {}
                    Ok(OpResult::Error { code }) => event.code = Some(code),
                    Err(err) => event.code = Some(err.code()),
                }
            }
            (Payload::Transaction(record), RawOutcome::Multi(result)) => match result {
                Ok(results) => event.op_results = Some(wrap_results(record, results, &self.namespace)?),
                Err(StoreError::MultiAborted { code, results, .. }) => {
                    event.code = Some(code);
                    event.op_results = Some(wrap_results(record, results, &self.namespace)?);
                }
                Err(err) => event.code = Some(err.code()),
            },
            _ => return Err(CoreError::protocol("completion does not match the submitted call")),
        }
        Ok(event)
    }

    fn finish(&self, queued: QueuedOperation, outcome: RawOutcome) {
        let event = match self.translate(&queued, outcome) {
            Ok(event) => event,
            Err(err) => {
                self.listeners.report_unhandled(
                    queued.backgrounding.error_listener(),
                    "could not translate background result",
                    &err,
                );
                queued.error_event(ErrorCode::RuntimeInconsistency)
            }
        };
        self.deliver(queued, event);
    }

    fn deliver(&self, queued: QueuedOperation, mut event: Event) {
        let backgrounding = queued.backgrounding;
        event.context = backgrounding.context().cloned();
        let executor = backgrounding
            .executor()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_executor));
        let listeners = Arc::clone(&self.listeners);

        match backgrounding.callback().cloned() {
            Some(callback) => {
                let error_listener = backgrounding.error_listener().cloned();
                executor.execute(Box::new(move || {
                    if let Err(err) = run_callback(callback.as_ref(), &event) {
                        listeners.report_unhandled(
                            error_listener.as_ref(),
                            "background callback failed",
                            &err,
                        );
                    }
                }));
            }
            None => executor.execute(Box::new(move || listeners.dispatch_event(&event))),
        }
    }
}

/// Owns the background processing thread.
pub struct BackgroundProcessor {
    shared: Arc<ProcessorShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundProcessor {
    pub(crate) fn start(
        client: Arc<dyn StoreClient>,
        policy: Arc<dyn RetryPolicy>,
        namespace: Namespace,
        namespace_root: Option<Arc<EnsureContainers>>,
        default_executor: Arc<dyn CallbackExecutor>,
        listeners: Arc<Listeners>,
    ) -> CoreResult<Self> {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(ProcessorShared {
            client,
            policy,
            namespace,
            namespace_root,
            default_executor,
            listeners,
            gate: Mutex::new(Some(tx)),
        });
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(PROCESSOR_THREAD_NAME.to_string())
            .spawn(move || run(worker, rx))?;
        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues an operation.
    pub fn enqueue(&self, queued: QueuedOperation) -> CoreResult<()> {
        let gate = self.shared.gate.lock();
        let tx = gate.as_ref().ok_or(CoreError::ShuttingDown)?;
        tx.send(Message::Submit(queued))
            .map_err(|_| CoreError::ShuttingDown)
    }

    /// Returns true until [`BackgroundProcessor::shutdown`] is called.
    pub fn is_running(&self) -> bool {
        self.shared.gate.lock().is_some()
    }

    /// Stops accepting work and waits for queued work to be handed off.
    ///
    /// Every accepted operation still produces its event: queued ones are
    /// submitted, delayed retries finish with their last outcome, and raw
    /// completions arriving later are finished without retry.
    pub fn shutdown(&self) {
        let Some(tx) = self.shared.gate.lock().take() else {
            return;
        };
        let _ = tx.send(Message::Shutdown);
        drop(tx);
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for BackgroundProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for BackgroundProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundProcessor")
            .field("running", &self.is_running())
            .finish()
    }
}

fn run(shared: Arc<ProcessorShared>, rx: Receiver<Message>) {
    let mut delayed: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
    let mut parked: HashMap<u64, (QueuedOperation, RawOutcome)> = HashMap::new();
    let mut next_id = 0u64;

    loop {
        let now = Instant::now();
        while let Some(&Reverse((due, id))) = delayed.peek() {
            if due > now {
                break;
            }
            delayed.pop();
            if let Some((mut queued, _)) = parked.remove(&id) {
                queued.retry_count += 1;
                shared.perform(queued);
            }
        }

        let message = match delayed.peek() {
            Some(&Reverse((due, _))) => rx.recv_timeout(due.saturating_duration_since(now)),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match message {
            Ok(Message::Submit(queued)) => shared.perform(queued),
            Ok(Message::Completed(queued, outcome)) => match shared.retry_delay(&queued, &outcome) {
                Some(delay) => {
                    debug!(retry = queued.retry_count + 1, ?delay, "scheduling background retry");
                    let id = next_id;
                    next_id += 1;
                    delayed.push(Reverse((Instant::now() + delay, id)));
                    parked.insert(id, (queued, outcome));
                }
                None => shared.finish(queued, outcome),
            },
            Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    while let Ok(message) = rx.try_recv() {
        match message {
            Message::Submit(queued) => shared.perform(queued),
            Message::Completed(queued, outcome) => shared.finish(queued, outcome),
            Message::Shutdown => {}
        }
    }
    for (_, (queued, outcome)) in parked.drain() {
        shared.finish(queued, outcome);
    }
    debug!("background processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::framework::Framework;
    use crate::retry::{RetryNTimes, RetrySleeper};
    use crate::transaction::TransactionOp;
    use crate::CallbackError;
    use ensemble_store::{Acl, Completion, InMemoryStore, MemorySession, Stat};

    /// A session whose async multi drops the last result.
    struct ShortMulti {
        inner: MemorySession,
    }

    impl StoreClient for ShortMulti {
        fn submit(&self, op: &Op) -> StoreResult<OpResult> {
            self.inner.submit(op)
        }

        fn submit_async(&self, op: Op, completion: Completion<OpResult>) {
            self.inner.submit_async(op, completion)
        }

        fn multi(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>> {
            self.inner.multi(ops)
        }

        fn multi_async(&self, ops: Vec<Op>, completion: Completion<Vec<OpResult>>) {
            self.inner.multi_async(
                ops,
                Box::new(move |result| {
                    completion(result.map(|mut results| {
                        results.pop();
                        results
                    }))
                }),
            )
        }

        fn exists(&self, path: &str) -> StoreResult<Option<Stat>> {
            self.inner.exists(path)
        }

        fn get_data(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)> {
            self.inner.get_data(path)
        }

        fn get_children(&self, path: &str) -> StoreResult<Vec<String>> {
            self.inner.get_children(path)
        }

        fn set_acl(&self, path: &str, acl: &[Acl], version: i32) -> StoreResult<Stat> {
            self.inner.set_acl(path, acl, version)
        }

        fn session_id(&self) -> i64 {
            self.inner.session_id()
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        fn close(&self) -> StoreResult<()> {
            self.inner.close()
        }
    }

    fn short_multi_framework() -> Framework {
        let store = InMemoryStore::new();
        let client = ShortMulti {
            inner: store.connect().unwrap(),
        };
        Framework::new(Arc::new(client), ClientConfig::default()).unwrap()
    }

    fn recording_callback(events: &Arc<Mutex<Vec<Event>>>) -> Backgrounding {
        let events = Arc::clone(events);
        Backgrounding::background().with_callback(
            move |event: &Event| -> Result<(), CallbackError> {
                events.lock().push(event.clone());
                Ok(())
            },
        )
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[derive(Debug, Default)]
    struct CountingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl RetrySleeper for CountingSleeper {
        fn sleep_for(&self, duration: Duration) {
            self.sleeps.lock().push(duration);
        }
    }

    #[test]
    fn namespace_root_retries_without_sleeping_on_processor() {
        let store = InMemoryStore::new();
        let sleeper = Arc::new(CountingSleeper::default());
        let config = ClientConfig::default()
            .with_namespace("svc")
            .with_retry_policy(Arc::new(RetryNTimes::new(5, Duration::from_millis(1))))
            .with_sleeper(Arc::clone(&sleeper) as Arc<dyn RetrySleeper>);
        let framework = Framework::new(Arc::new(store.connect().unwrap()), config).unwrap();
        store.fail_next(ErrorCode::ConnectionLoss, 2);

        let events = Arc::new(Mutex::new(Vec::new()));
        framework
            .execute(
                TransactionOp::create("/job").build(),
                &recording_callback(&events),
            )
            .unwrap();

        wait_until(|| !events.lock().is_empty());
        let events = events.lock().clone();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok(), "{:?}", events[0]);
        assert_eq!(events[0].name.as_deref(), Some("/job"));
        assert!(store.exists("/svc/job"));
        assert!(sleeper.sleeps.lock().is_empty());
    }

    #[test]
    fn namespace_root_exhaustion_is_one_error_event() {
        let store = InMemoryStore::new();
        let config = ClientConfig::default()
            .with_namespace("svc")
            .with_retry_policy(Arc::new(RetryNTimes::new(2, Duration::from_millis(1))));
        let framework = Framework::new(Arc::new(store.connect().unwrap()), config).unwrap();
        store.fail_next(ErrorCode::ConnectionLoss, 10);

        let events = Arc::new(Mutex::new(Vec::new()));
        framework
            .submit(
                [TransactionOp::create("/job").build()],
                &recording_callback(&events),
            )
            .unwrap();

        wait_until(|| !events.lock().is_empty());
        thread::sleep(Duration::from_millis(50));
        let events = events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, Some(ErrorCode::ConnectionLoss));
        assert!(!store.exists("/svc"));
    }

    #[test]
    fn mismatched_results_go_to_call_listener() {
        let framework = short_multi_framework();
        let events = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let mode = recording_callback(&events).with_error_listener(
            move |message: &str, err: &CoreError| {
                sink.lock()
                    .push((message.to_string(), matches!(err, CoreError::Protocol { .. })));
            },
        );

        framework
            .submit(
                [
                    TransactionOp::create("/a").build(),
                    TransactionOp::create("/b").build(),
                ],
                &mode,
            )
            .unwrap();

        wait_until(|| !events.lock().is_empty() && !errors.lock().is_empty());
        thread::sleep(Duration::from_millis(50));

        let errors = errors.lock().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1, "expected a protocol error");
        assert!(errors[0].0.contains("translate"));

        let events = events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Transaction);
        assert_eq!(events[0].code, Some(ErrorCode::RuntimeInconsistency));
        assert!(events[0].op_results.is_none());
    }

    #[test]
    fn mismatched_results_without_listener_still_deliver_once() {
        let framework = short_multi_framework();
        let events = Arc::new(Mutex::new(Vec::new()));

        framework
            .submit(
                [TransactionOp::create("/only").build()],
                &recording_callback(&events),
            )
            .unwrap();

        wait_until(|| !events.lock().is_empty());
        thread::sleep(Duration::from_millis(50));

        let events = events.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code, Some(ErrorCode::RuntimeInconsistency));
    }
}
