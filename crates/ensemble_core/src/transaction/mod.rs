//! Atomic multi-operation transactions.
//!
//! Operations are built with [`TransactionOp`], validated in order against
//! the client's schemas, submitted as one atomic batch and mapped back onto
//! [`TransactionResult`] values in submission order.

mod multi;
mod op;
mod record;
mod result;

pub use multi::MultiTransaction;
pub use op::{
    CheckBuilder, CreateBuilder, DeleteBuilder, OperationType, SetDataBuilder, TransactionOp,
    TypeAndPath,
};
pub use record::MultiTransactionRecord;
pub use result::{wrap_results, TransactionResult};
