use super::op::{OperationType, TypeAndPath};
use super::record::MultiTransactionRecord;
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use ensemble_store::{ErrorCode, OpResult, Stat};

/// Outcome of one operation in a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    /// Type of the originating operation.
    pub op_type: OperationType,
    /// Path the caller gave the operation.
    pub for_path: String,
    /// Actual created path, for creates.
    pub result_path: Option<String>,
    /// Stat after the operation, when the store reported one.
    pub result_stat: Option<Stat>,
    /// Error code if this operation failed or was not executed.
    pub error: Option<ErrorCode>,
}

impl TransactionResult {
    /// Returns true if the operation took effect.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn for_meta(meta: &TypeAndPath) -> Self {
        Self {
            op_type: meta.op_type,
            for_path: meta.for_path.clone(),
            result_path: None,
            result_stat: None,
            error: None,
        }
    }
}

fn make_result(meta: &TypeAndPath, raw: OpResult, namespace: &Namespace) -> CoreResult<TransactionResult> {
    let mut result = TransactionResult::for_meta(meta);
    match (meta.op_type, raw) {
        (_, OpResult::Error { code }) => result.error = Some(code),
        (OperationType::Create, OpResult::Create { path, stat }) => {
            result.result_path = Some(namespace.unfix(&path));
            result.result_stat = stat;
        }
        (OperationType::SetData, OpResult::SetData { stat }) => result.result_stat = Some(stat),
        (OperationType::Delete, OpResult::Delete) | (OperationType::Check, OpResult::Check) => {}
        (op_type, raw) => {
            return Err(CoreError::protocol(format!(
                "{op_type} on {} answered with {raw:?}",
                meta.for_path
            )))
        }
    }
    Ok(result)
}

/// Maps raw store results back onto the record, in submission order.
pub fn wrap_results(
    record: &MultiTransactionRecord,
    results: Vec<OpResult>,
    namespace: &Namespace,
) -> CoreResult<Vec<TransactionResult>> {
    if results.len() != record.len() {
        return Err(CoreError::protocol(format!(
            "transaction of {} operations answered with {} results",
            record.len(),
            results.len()
        )));
    }
    record
        .metadata_iter()
        .zip(results)
        .map(|(meta, raw)| make_result(meta, raw, namespace))
        .collect()
}
