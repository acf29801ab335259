//! The client facade tying the components together.

use crate::background::{
    BackgroundCallback, BackgroundProcessor, Backgrounding, DeliveryThread, Event, EventType,
    Listeners, Payload, QueuedOperation, Submission, UnhandledErrorListener, DELIVERY_THREAD_NAME,
};
use crate::config::ClientConfig;
use crate::ensure::{EnsureContainers, PathEnsurer};
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::retry::{idempotent_outcome, RetryLoop};
use crate::transaction::{
    wrap_results, MultiTransaction, MultiTransactionRecord, TransactionOp, TransactionResult,
};
use ensemble_store::{path, ErrorCode, OpResult, StoreClient, StoreError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A coordination client over one store session.
///
/// Every call is validated against the configured schemas, namespaced, and
/// then either run inline through the retry loop or queued to the
/// background processor, depending on its [`Backgrounding`].
pub struct Framework {
    client: Arc<dyn StoreClient>,
    config: ClientConfig,
    namespace: Namespace,
    namespace_root: Option<Arc<EnsureContainers>>,
    listeners: Arc<Listeners>,
    processor: BackgroundProcessor,
    ensurer: PathEnsurer,
    closed: AtomicBool,
}

impl Framework {
    /// Starts a framework over `client`.
    pub fn new(client: Arc<dyn StoreClient>, config: ClientConfig) -> CoreResult<Self> {
        let namespace = config.validate()?;
        let namespace_root = namespace.root().map(|root| {
            let raw = PathEnsurer::new(Arc::clone(&client), &config, Namespace::none());
            Arc::new(EnsureContainers::new(raw, root))
        });
        let listeners = Arc::new(Listeners::default());
        let processor = BackgroundProcessor::start(
            Arc::clone(&client),
            Arc::clone(config.retry_policy()),
            namespace.clone(),
            namespace_root.clone(),
            Arc::new(DeliveryThread::spawn(DELIVERY_THREAD_NAME)?),
            Arc::clone(&listeners),
        )?;
        let ensurer = PathEnsurer::new(Arc::clone(&client), &config, namespace.clone());
        debug!(namespace = ?namespace.root(), "framework started");

        Ok(Self {
            client,
            config,
            namespace,
            namespace_root,
            listeners,
            processor,
            ensurer,
            closed: AtomicBool::new(false),
        })
    }

    /// The underlying store client.
    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// The configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The resolved namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Starts a transaction.
    pub fn transaction(&self) -> MultiTransaction<'_> {
        MultiTransaction::new(self)
    }

    /// Runs a single operation.
    ///
    /// In the foreground a repeated create that finds its node, or a repeated
    /// delete that finds none, counts as success.
    pub fn execute(
        &self,
        op: TransactionOp,
        backgrounding: &Backgrounding,
    ) -> CoreResult<Submission<OpResult>> {
        self.check_open()?;
        let for_path = op.type_and_path().for_path.clone();
        path::validate_path(&for_path).map_err(|e| CoreError::invalid_argument(e.to_string()))?;
        let request = self
            .namespace
            .fix_op(&op.resolved_op(self.config.default_acl()));
        self.config
            .schema_set()
            .validate_op_for(&for_path, &request)
            .map_err(|violation| CoreError::SchemaViolation {
                index: 0,
                path: for_path.clone(),
                violation,
            })?;

        if backgrounding.in_background() {
            self.enqueue(
                Payload::Single {
                    op: request,
                    for_path,
                },
                backgrounding,
            )?;
            return Ok(Submission::Queued);
        }

        self.ensure_namespace()?;
        let result = RetryLoop::call_with_retry(
            self.config.retry_policy().as_ref(),
            self.config.sleeper().as_ref(),
            &op.type_and_path().op_type.to_string(),
            |attempt| match self.client.submit(&request) {
                Err(err) if attempt > 0 => idempotent_outcome(&request, &err).ok_or(err),
                other => other,
            },
        )?;
        let result = match result {
            OpResult::Create { path, stat } => OpResult::Create {
                path: self.namespace.unfix(&path),
                stat,
            },
            other => other,
        };
        Ok(Submission::Completed(result))
    }

    /// Validates and submits `ops` as one atomic transaction.
    ///
    /// Operations are validated in order and the first violation aborts the
    /// whole submission before anything is sent.
    pub fn submit(
        &self,
        ops: impl IntoIterator<Item = TransactionOp>,
        backgrounding: &Backgrounding,
    ) -> CoreResult<Submission<Vec<TransactionResult>>> {
        self.check_open()?;
        let record = self.build_record(ops)?;

        if backgrounding.in_background() {
            self.enqueue(Payload::Transaction(record), backgrounding)?;
            return Ok(Submission::Queued);
        }

        self.ensure_namespace()?;
        let ops = record.ops();
        let outcome = RetryLoop::call_with_retry(
            self.config.retry_policy().as_ref(),
            self.config.sleeper().as_ref(),
            "transaction",
            |_| self.client.multi(&ops),
        );
        match outcome {
            Ok(results) => Ok(Submission::Completed(wrap_results(
                &record,
                results,
                &self.namespace,
            )?)),
            Err(CoreError::Store(StoreError::MultiAborted {
                index,
                code,
                results,
            })) => {
                let results = wrap_results(&record, results, &self.namespace)?;
                let path = record
                    .metadata(index)
                    .map(|meta| meta.for_path.clone())
                    .unwrap_or_default();
                Err(CoreError::TransactionFailed {
                    index,
                    path,
                    code,
                    results,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn build_record(
        &self,
        ops: impl IntoIterator<Item = TransactionOp>,
    ) -> CoreResult<MultiTransactionRecord> {
        let mut record = MultiTransactionRecord::new();
        for (index, op) in ops.into_iter().enumerate() {
            let meta = op.type_and_path();
            path::validate_path(&meta.for_path).map_err(|e| {
                CoreError::invalid_argument(format!("operation {index}: {e}"))
            })?;
            let request = self
                .namespace
                .fix_op(&op.resolved_op(self.config.default_acl()));
            self.config
                .schema_set()
                .validate_op_for(&meta.for_path, &request)
                .map_err(|violation| CoreError::SchemaViolation {
                    index,
                    path: meta.for_path.clone(),
                    violation,
                })?;
            record.add(request, meta.clone());
        }
        if record.is_empty() {
            return Err(CoreError::invalid_argument("transaction has no operations"));
        }
        Ok(record)
    }

    fn enqueue(&self, payload: Payload, backgrounding: &Backgrounding) -> CoreResult<()> {
        let mut queued = QueuedOperation::new(payload, backgrounding.clone());
        if !self.client.is_connected() {
            let event = match queued.payload() {
                Payload::Single { op, for_path } => {
                    Event::new(op.kind().into(), Some(for_path.clone()))
                }
                Payload::Transaction(_) => Event::new(EventType::Transaction, None),
            };
            queued = queued.with_precomputed(event.with_code(ErrorCode::SessionExpired));
        }
        self.processor.enqueue(queued)
    }

    fn ensure_namespace(&self) -> CoreResult<()> {
        match &self.namespace_root {
            Some(root) => root.ensure(),
            None => Ok(()),
        }
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CoreError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Creates `path` and its ancestors once for the life of this framework.
    pub fn ensure_path(&self, path: &str) -> CoreResult<()> {
        self.check_open()?;
        self.ensurer.ensure(path)
    }

    /// The framework's shared path ensurer.
    pub fn path_ensurer(&self) -> &PathEnsurer {
        &self.ensurer
    }

    /// A helper that ensures `path` once, with a cache of its own.
    pub fn ensure_containers(&self, path: impl Into<String>) -> EnsureContainers {
        let ensurer = PathEnsurer::new(Arc::clone(&self.client), &self.config, self.namespace.clone());
        EnsureContainers::new(ensurer, path)
    }

    /// Adds a listener for errors that have no per-call listener.
    pub fn add_unhandled_error_listener(&self, listener: impl UnhandledErrorListener + 'static) {
        self.listeners.add_unhandled(Arc::new(listener));
    }

    /// Adds a listener for background events that have no callback.
    pub fn add_event_listener(&self, listener: impl BackgroundCallback + 'static) {
        self.listeners.add_event(Arc::new(listener));
    }

    /// Returns true once [`Framework::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops the background processor and closes the store session.
    ///
    /// Background calls already accepted still deliver their events.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.processor.shutdown();
        if let Err(err) = self.client.close() {
            warn!(error = %err, "error closing store session");
        }
        debug!("framework closed");
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("namespace", &self.namespace)
            .field("processor", &self.processor)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryNTimes;
    use crate::schema::{Allowance, Schema, SchemaSet};
    use ensemble_store::{CreateMode, InMemoryStore};
    use std::sync::mpsc;
    use std::time::Duration;

    fn framework(config: ClientConfig) -> (InMemoryStore, Framework) {
        let store = InMemoryStore::new();
        let framework = Framework::new(Arc::new(store.connect().unwrap()), config).unwrap();
        (store, framework)
    }

    fn fast_retry() -> ClientConfig {
        ClientConfig::default().with_retry_policy(Arc::new(RetryNTimes::new(5, Duration::ZERO)))
    }

    #[test]
    fn foreground_transaction_applies_all() {
        let (store, framework) = framework(ClientConfig::default());
        let results = framework
            .transaction()
            .for_operations([
                TransactionOp::create("/a").with_data("1").build(),
                TransactionOp::create("/a/b").build(),
                TransactionOp::set_data("/a", "2").build(),
                TransactionOp::check("/a").with_version(1).build(),
            ])
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[1].for_path, "/a/b");
        assert_eq!(store.data("/a"), Some(b"2".to_vec()));
    }

    #[test]
    fn empty_transaction_is_rejected() {
        let (store, framework) = framework(ClientConfig::default());
        let err = framework.transaction().for_operations([]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
        assert_eq!(store.request_count(), 0);
    }

    #[test]
    fn first_violation_aborts_before_submission() {
        let schemas = SchemaSet::new(vec![
            Schema::for_path("locked", "/locked")
                .with_can_be_deleted(false)
                .build(),
            Schema::for_pattern("eph", "/eph/.*")
                .unwrap()
                .with_ephemeral(Allowance::Must)
                .build(),
        ]);
        let (store, framework) = framework(ClientConfig::default().with_schema_set(schemas));
        let err = framework
            .transaction()
            .for_operations([
                TransactionOp::create("/ok").build(),
                TransactionOp::delete("/locked").build(),
                TransactionOp::create("/eph/x").build(),
            ])
            .unwrap_err();
        match err {
            CoreError::SchemaViolation { index, path, .. } => {
                assert_eq!(index, 1);
                assert_eq!(path, "/locked");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.request_count(), 0);
        assert!(!store.exists("/ok"));
    }

    #[test]
    fn aborted_transaction_reports_offender() {
        let (store, framework) = framework(ClientConfig::default());
        let err = framework
            .transaction()
            .for_operations([
                TransactionOp::create("/a").build(),
                TransactionOp::delete("/missing").build(),
            ])
            .unwrap_err();
        match err {
            CoreError::TransactionFailed {
                index,
                path,
                code,
                results,
            } => {
                assert_eq!(index, 1);
                assert_eq!(path, "/missing");
                assert_eq!(code, ErrorCode::NoNode);
                assert_eq!(results.len(), 2);
                assert_eq!(results[1].error, Some(ErrorCode::NoNode));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.exists("/a"));
    }

    #[test]
    fn transaction_retries_connection_loss_once_applied() {
        let (store, framework) = framework(fast_retry());
        store.fail_next(ErrorCode::ConnectionLoss, 2);
        let results = framework
            .transaction()
            .for_operations([TransactionOp::create("/r").build()])
            .unwrap()
            .completed()
            .unwrap();
        assert!(results[0].is_ok());
        assert_eq!(store.multi_commit_count(), 1);
    }

    #[test]
    fn retried_single_create_treats_node_exists_as_success() {
        let (store, framework) = framework(fast_retry());
        store.fail_next_after_apply(ErrorCode::ConnectionLoss, 1);
        let result = framework
            .execute(TransactionOp::create("/once").build(), &Backgrounding::foreground())
            .unwrap()
            .completed()
            .unwrap();
        assert!(matches!(result, OpResult::Create { ref path, stat: None } if path == "/once"));
        assert!(store.exists("/once"));
    }

    #[test]
    fn first_attempt_node_exists_is_an_error() {
        let (_store, framework) = framework(ClientConfig::default());
        let mode = Backgrounding::foreground();
        framework.execute(TransactionOp::create("/dup").build(), &mode).unwrap();
        let err = framework
            .execute(TransactionOp::create("/dup").build(), &mode)
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NodeExists));
    }

    #[test]
    fn namespace_is_applied_and_stripped() {
        let (store, framework) = framework(ClientConfig::default().with_namespace("app"));
        let results = framework
            .transaction()
            .for_operations([TransactionOp::create("/seq-")
                .with_mode(CreateMode::PersistentSequential)
                .build()])
            .unwrap()
            .completed()
            .unwrap();
        let created = results[0].result_path.clone().unwrap();
        assert!(created.starts_with("/seq-"));
        assert!(store.exists(&format!("/app{created}")));
        assert_eq!(store.mode("/app"), Some(CreateMode::Container));
    }

    #[test]
    fn background_execute_delivers_event() {
        let (_store, framework) = framework(ClientConfig::default());
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        let mode = Backgrounding::background()
            .with_callback(move |event: &Event| -> Result<(), crate::CallbackError> {
                tx.lock().send(event.clone())?;
                Ok(())
            })
            .with_context("ctx");
        let submission = framework
            .execute(TransactionOp::create("/bg").build(), &mode)
            .unwrap();
        assert!(submission.is_queued());

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(event.is_ok());
        assert_eq!(event.event_type, EventType::Create);
        assert_eq!(event.name.as_deref(), Some("/bg"));
        assert_eq!(event.context_as::<&str>(), Some(&"ctx"));
    }

    #[test]
    fn closed_framework_rejects_calls() {
        let (_store, framework) = framework(ClientConfig::default());
        framework.close();
        assert!(framework.is_closed());
        let err = framework
            .execute(TransactionOp::check("/").build(), &Backgrounding::foreground())
            .unwrap_err();
        assert!(matches!(err, CoreError::ShuttingDown));
        assert!(matches!(framework.ensure_path("/x"), Err(CoreError::ShuttingDown)));
    }
}
