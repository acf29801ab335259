//! Property-based test generators using proptest.
//!
//! Strategies produce valid paths and operation batches whose paths do not
//! collide, so every generated batch can be applied to an empty store.

use ensemble_core::TransactionOp;
use ensemble_store::CreateMode;
use proptest::prelude::*;

/// Strategy for a single valid path segment.
pub fn node_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,11}").expect("Invalid regex")
}

/// Strategy for valid absolute paths one to four levels deep.
pub fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(node_name_strategy(), 1..5)
        .prop_map(|segments| format!("/{}", segments.join("/")))
}

/// Strategy for node payloads.
pub fn data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for non-sequential, non-ephemeral create modes.
pub fn plain_create_mode_strategy() -> impl Strategy<Value = CreateMode> {
    prop_oneof![Just(CreateMode::Persistent), Just(CreateMode::Container)]
}

/// Strategy for batches that apply cleanly to an empty store.
///
/// Each batch creates between one and six distinct top-level nodes, and may
/// follow up with updates and version checks against them.
pub fn transaction_strategy() -> impl Strategy<Value = Vec<TransactionOp>> {
    (
        prop::collection::btree_set(node_name_strategy(), 1..7),
        prop::collection::vec((data_strategy(), plain_create_mode_strategy()), 6),
        prop::collection::vec(any::<bool>(), 6),
    )
        .prop_map(|(names, payloads, touch)| {
            let paths: Vec<String> = names.into_iter().map(|n| format!("/{n}")).collect();
            let mut ops: Vec<TransactionOp> = paths
                .iter()
                .zip(&payloads)
                .map(|(path, (data, mode))| {
                    TransactionOp::create(path.as_str())
                        .with_data(data.clone())
                        .with_mode(*mode)
                        .build()
                })
                .collect();
            for (path, touched) in paths.iter().zip(&touch) {
                if *touched {
                    ops.push(TransactionOp::set_data(path.as_str(), b"updated".to_vec()).build());
                    ops.push(TransactionOp::check(path.as_str()).with_version(1).build());
                }
            }
            ops
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_store::path::validate_path;

    proptest! {
        #[test]
        fn generated_paths_are_valid(path in path_strategy()) {
            prop_assert!(validate_path(&path).is_ok());
        }

        #[test]
        fn batches_are_non_empty(ops in transaction_strategy()) {
            prop_assert!(!ops.is_empty());
        }
    }
}
