use ensemble_store::{ErrorCode, Op, OpResult, StoreError};
use tracing::warn;

/// Reclassifies the error from a repeated single call as success when the
/// earlier, unacknowledged attempt must already have done the work.
///
/// A non-sequential create that reports `NodeExists` and a delete that
/// reports `NoNode` are treated as having succeeded. Callers only apply this
/// on retried attempts; on a first attempt those codes are genuine.
pub fn idempotent_outcome(op: &Op, error: &StoreError) -> Option<OpResult> {
    let code = match error {
        StoreError::Keeper { code, .. } => *code,
        _ => return None,
    };

    let outcome = match (op, code) {
        (Op::Create { path, mode, .. }, ErrorCode::NodeExists) if !mode.is_sequential() => {
            OpResult::Create {
                path: path.clone(),
                stat: None,
            }
        }
        (Op::CreateContainer { path, .. }, ErrorCode::NodeExists) => OpResult::Create {
            path: path.clone(),
            stat: None,
        },
        (Op::Delete { .. } | Op::DeleteContainer { .. }, ErrorCode::NoNode) => OpResult::Delete,
        _ => return None,
    };

    warn!(path = op.path(), %code, "treating repeated call as already applied");
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_store::{Acl, CreateMode, ANY_VERSION};

    fn create(mode: CreateMode) -> Op {
        Op::Create {
            path: "/a".into(),
            data: Vec::new(),
            acl: Acl::open_unsafe(),
            mode,
        }
    }

    #[test]
    fn create_node_exists_is_success() {
        let err = StoreError::keeper(ErrorCode::NodeExists, "/a");
        assert_eq!(
            idempotent_outcome(&create(CreateMode::Persistent), &err),
            Some(OpResult::Create {
                path: "/a".into(),
                stat: None
            })
        );
    }

    #[test]
    fn sequential_create_is_not_reclassified() {
        let err = StoreError::keeper(ErrorCode::NodeExists, "/a");
        assert_eq!(
            idempotent_outcome(&create(CreateMode::PersistentSequential), &err),
            None
        );
    }

    #[test]
    fn delete_no_node_is_success() {
        let op = Op::Delete {
            path: "/a".into(),
            version: ANY_VERSION,
        };
        let err = StoreError::keeper(ErrorCode::NoNode, "/a");
        assert_eq!(idempotent_outcome(&op, &err), Some(OpResult::Delete));
    }

    #[test]
    fn other_codes_pass_through() {
        let op = Op::SetData {
            path: "/a".into(),
            data: Vec::new(),
            version: ANY_VERSION,
        };
        let err = StoreError::keeper(ErrorCode::NoNode, "/a");
        assert_eq!(idempotent_outcome(&op, &err), None);
        assert_eq!(
            idempotent_outcome(&create(CreateMode::Persistent), &StoreError::Closed),
            None
        );
    }
}
