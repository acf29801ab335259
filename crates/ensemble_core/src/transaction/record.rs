use super::op::TypeAndPath;
use ensemble_store::Op;

#[derive(Debug, Clone)]
struct RecordEntry {
    op: Op,
    meta: TypeAndPath,
}

/// An ordered, validated batch ready for submission.
///
/// Holds each request as the store will see it (namespace applied) together
/// with the type and caller path its result is reported under. Insertion
/// order is both the submission order and the result order.
#[derive(Debug, Clone, Default)]
pub struct MultiTransactionRecord {
    entries: Vec<RecordEntry>,
}

impl MultiTransactionRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    pub fn add(&mut self, op: Op, meta: TypeAndPath) {
        self.entries.push(RecordEntry { op, meta });
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no operations were added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The store requests in order.
    pub fn ops(&self) -> Vec<Op> {
        self.entries.iter().map(|e| e.op.clone()).collect()
    }

    /// Metadata for the operation at `index`.
    pub fn metadata(&self, index: usize) -> Option<&TypeAndPath> {
        self.entries.get(index).map(|e| &e.meta)
    }

    /// Metadata for every operation in order.
    pub fn metadata_iter(&self) -> impl Iterator<Item = &TypeAndPath> {
        self.entries.iter().map(|e| &e.meta)
    }
}
