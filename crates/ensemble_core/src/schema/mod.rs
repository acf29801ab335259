//! Path-scoped validation of operations before they reach the store.
//!
//! A [`SchemaSet`] maps each path to a [`Schema`] and checks create modes,
//! payloads, ACLs and deletability. Validation performs no I/O.

mod definition;
mod set;
mod violation;

pub use definition::{
    AclPolicy, Allowance, DataFormat, DataValidator, PathMatcher, Schema, SchemaBuilder,
    SchemaDefinition, DEFAULT_SCHEMA_NAME,
};
pub use set::SchemaSet;
pub use violation::SchemaViolation;
