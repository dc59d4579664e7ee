//! driftway-core: schema descriptors and DDL generation.
//!
//! The database-free half of the toolkit: declare collections, fields and
//! indexes once in a [`descriptor::SchemaRegistry`], then turn those
//! declarations into guarded DDL with the [`ddl`] builders, hash schema
//! states with [`hash`], and compute index reconciliation plans with
//! [`diff`]. Execution lives in `driftway-pg`.

pub mod ddl;
pub mod descriptor;
pub mod diff;
pub mod error;
pub mod hash;

pub use ddl::{quote_ident, Statement};
pub use descriptor::{
    CollectionDescriptor, CustomIndex, FieldDescriptor, FieldType, IndexDescriptor, SchemaRegistry,
    SqlFunction,
};
pub use diff::{diff_indexes, IndexPlan, LiveIndex};
pub use error::CoreError;
pub use hash::{content_hash, ColumnSnapshot, SchemaSnapshot, TableSnapshot};
