//! Transaction engine properties.

use ensemble_core::schema::{DataValidator, Schema, SchemaSet};
use ensemble_core::{Backgrounding, CoreError, EventType, OperationType, RetryNTimes, TransactionOp};
use ensemble_store::{path, ErrorCode, IO_THREAD_NAME};
use ensemble_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn frozen_schemas() -> SchemaSet {
    SchemaSet::new(vec![Schema::for_pattern("frozen", "/frozen(/.*)?")
        .unwrap()
        .with_data_validator(DataValidator::MaxLength(0))
        .with_can_be_deleted(false)
        .build()])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn results_match_submission_order(ops in transaction_strategy()) {
        let cluster = TestCluster::new();
        let expected: Vec<_> = ops.iter().map(|op| op.type_and_path().clone()).collect();

        let results = cluster
            .framework
            .transaction()
            .for_operations(ops)
            .unwrap()
            .completed()
            .unwrap();

        prop_assert_eq!(results.len(), expected.len());
        for (result, meta) in results.iter().zip(&expected) {
            prop_assert_eq!(result.op_type, meta.op_type);
            prop_assert_eq!(&result.for_path, &meta.for_path);
            prop_assert!(result.is_ok());
            if result.op_type == OperationType::Create {
                prop_assert_eq!(result.result_path.as_deref(), Some(meta.for_path.as_str()));
            }
        }
        prop_assert_eq!(cluster.store.multi_commit_count(), 1);
    }

    #[test]
    fn violation_rejects_whole_batch(
        ops in transaction_strategy(),
        position in any::<prop::sample::Index>(),
    ) {
        prop_assume!(ops.iter().all(|op| op.type_and_path().for_path != "/frozen"));
        let cluster = TestCluster::with_config(test_config().with_schema_set(frozen_schemas()));
        let mut ops = ops;
        let k = position.index(ops.len() + 1);
        ops.insert(k, TransactionOp::create("/frozen").with_data("not allowed").build());

        let err = cluster.framework.transaction().for_operations(ops).unwrap_err();
        match err {
            CoreError::SchemaViolation { index, path, .. } => {
                prop_assert_eq!(index, k);
                prop_assert_eq!(path, "/frozen");
            }
            other => prop_assert!(false, "unexpected error: {:?}", other),
        }
        prop_assert_eq!(cluster.store.request_count(), 0);
        prop_assert_eq!(cluster.store.node_count(), 1);
    }
}

#[test]
fn only_first_violation_is_reported() {
    let cluster = TestCluster::with_config(test_config().with_schema_set(frozen_schemas()));
    let err = cluster
        .framework
        .transaction()
        .for_operations([
            TransactionOp::create("/ok").build(),
            TransactionOp::delete("/frozen").build(),
            TransactionOp::create("/frozen/a").with_data("x").build(),
        ])
        .unwrap_err();
    assert!(matches!(err, CoreError::SchemaViolation { index: 1, .. }));
}

#[test]
fn malformed_path_is_rejected_before_submission() {
    with_cluster(|cluster| {
        let err = cluster
            .framework
            .transaction()
            .for_operations([
                TransactionOp::create("/good").build(),
                TransactionOp::create("bad/path").build(),
            ])
            .unwrap_err();
        assert!(err.is_rejected_before_submission());
        assert_eq!(cluster.store.request_count(), 0);
    });
}

#[test]
fn abort_leaves_store_untouched() {
    with_cluster(|cluster| {
        let before = cluster.store.node_count();
        let err = cluster
            .framework
            .transaction()
            .for_operations([
                TransactionOp::create("/a").build(),
                TransactionOp::create("/a/b").build(),
                TransactionOp::set_data("/a", "x").with_version(7).build(),
            ])
            .unwrap_err();
        match err {
            CoreError::TransactionFailed {
                index,
                code,
                results,
                ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(code, ErrorCode::BadVersion);
                assert_eq!(results[0].error, Some(ErrorCode::RuntimeInconsistency));
                assert_eq!(results[2].error, Some(ErrorCode::BadVersion));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cluster.store.node_count(), before);
        assert_eq!(cluster.store.multi_commit_count(), 0);
    });
}

#[test]
fn repeated_connection_loss_commits_once() {
    with_cluster(|cluster| {
        cluster.store.fail_next(ErrorCode::ConnectionLoss, 4);
        let results = cluster
            .framework
            .transaction()
            .for_operations([
                TransactionOp::create("/r").with_data("1").build(),
                TransactionOp::create("/r/s").build(),
            ])
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(cluster.store.multi_commit_count(), 1);
        assert_eq!(cluster.store.request_count(), 5);
    });
}

#[test]
fn applied_batch_is_never_applied_twice() {
    with_cluster(|cluster| {
        // The first attempt commits but its acknowledgement is lost.
        cluster.store.fail_next_after_apply(ErrorCode::ConnectionLoss, 1);
        let err = cluster
            .framework
            .transaction()
            .for_operations([TransactionOp::create("/once").build()])
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NodeExists));
        assert_eq!(cluster.store.multi_commit_count(), 1);
        assert!(cluster.store.exists("/once"));
    });
}

#[test]
fn exhausted_retries_report_attempts() {
    let config = test_config().with_retry_policy(Arc::new(RetryNTimes::new(2, Duration::ZERO)));
    let cluster = TestCluster::with_config(config);
    cluster.store.fail_next(ErrorCode::ConnectionLoss, 10);
    let err = cluster
        .framework
        .transaction()
        .for_operations([TransactionOp::create("/x").build()])
        .unwrap_err();
    match err {
        CoreError::RetriesExhausted { attempts, source, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(source.code(), ErrorCode::ConnectionLoss);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(cluster.store.multi_commit_count(), 0);
}

#[test]
fn session_expiry_is_fatal() {
    with_cluster(|cluster| {
        let session = cluster.framework.client().session_id();
        cluster.store.expire_session(session);
        let err = cluster
            .framework
            .transaction()
            .for_operations([TransactionOp::create("/x").build()])
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::SessionExpired));
        assert!(matches!(err, CoreError::Store(_)));
    });
}

#[test]
fn background_transaction_delivers_one_event() {
    with_cluster(|cluster| {
        let recorder = EventRecorder::new();
        let submission = cluster
            .framework
            .transaction()
            .in_background_with(recorder.callback())
            .with_context(41u64)
            .for_operations([
                TransactionOp::create("/bg").build(),
                TransactionOp::check("/bg").with_version(0).build(),
            ])
            .unwrap();
        assert!(submission.is_queued());

        let recorded = recorder.wait_one().expect("no event delivered");
        let event = &recorded.event;
        assert!(event.is_ok());
        assert_eq!(event.event_type, EventType::Transaction);
        assert_eq!(event.context_as::<u64>(), Some(&41));
        let results = event.op_results.as_ref().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].result_path.as_deref(), Some("/bg"));
        assert_ne!(recorded.thread_name.as_deref(), Some(IO_THREAD_NAME));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(recorder.count(), 1);
    });
}

#[test]
fn background_abort_carries_results() {
    with_cluster(|cluster| {
        let recorder = EventRecorder::new();
        cluster
            .framework
            .transaction()
            .in_background_with(recorder.callback())
            .for_operations([
                TransactionOp::create("/a").build(),
                TransactionOp::delete("/missing").build(),
            ])
            .unwrap();

        let event = recorder.wait_one().expect("no event delivered").event;
        assert_eq!(event.code, Some(ErrorCode::NoNode));
        let results = event.op_results.unwrap();
        assert_eq!(results[1].error, Some(ErrorCode::NoNode));
        assert!(!cluster.store.exists("/a"));
    });
}

#[test]
fn background_retry_delivers_exactly_once() {
    with_cluster(|cluster| {
        cluster.store.fail_next(ErrorCode::ConnectionLoss, 3);
        let recorder = EventRecorder::new();
        cluster
            .framework
            .transaction()
            .in_background_with(recorder.callback())
            .for_operations([TransactionOp::create("/retried").build()])
            .unwrap();

        let event = recorder.wait_one().expect("no event delivered").event;
        assert!(event.is_ok());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(recorder.count(), 1);
        assert_eq!(cluster.store.multi_commit_count(), 1);
    });
}

#[test]
fn background_exhaustion_reports_connection_loss() {
    let config = test_config().with_retry_policy(Arc::new(RetryNTimes::new(1, Duration::ZERO)));
    let cluster = TestCluster::with_config(config);
    cluster.store.fail_next(ErrorCode::ConnectionLoss, 5);
    let recorder = EventRecorder::new();
    cluster
        .framework
        .transaction()
        .in_background_with(recorder.callback())
        .for_operations([TransactionOp::create("/never").build()])
        .unwrap();

    let event = recorder.wait_one().expect("no event delivered").event;
    assert_eq!(event.code, Some(ErrorCode::ConnectionLoss));
    assert!(event.op_results.is_none());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(recorder.count(), 1);
}

#[test]
fn namespaced_transaction_reports_caller_paths() {
    let cluster = TestCluster::with_config(test_config().with_namespace("tenant"));
    let results = cluster
        .framework
        .transaction()
        .for_operations([TransactionOp::create("/cfg").with_data("{}").build()])
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(results[0].for_path, "/cfg");
    assert_eq!(results[0].result_path.as_deref(), Some("/cfg"));
    assert!(cluster.store.exists("/tenant/cfg"));
    assert!(path::validate_path("/tenant/cfg").is_ok());
}

#[test]
fn background_submission_after_close_is_rejected() {
    with_cluster(|cluster| {
        cluster.framework.close();
        let err = cluster
            .framework
            .transaction()
            .with_backgrounding(Backgrounding::background())
            .for_operations([TransactionOp::create("/late").build()])
            .unwrap_err();
        assert!(matches!(err, CoreError::ShuttingDown));
    });
}
