//! driftway-pg: migration execution against Postgres.
//!
//! Built on sqlx. The [`runner::Runner`] applies [`runner::Migration`]s
//! sequentially, each in its own transaction, recording progress in the
//! `_driftway_migrations` ledger. [`sync`] reconciles declared indexes,
//! functions and extensions against the live catalog, [`normalize`] moves
//! editable-field content between inline and revision-table
//! representations, and [`tasks`] tracks the index builds that deliberately
//! escape the migration transaction.

pub mod context;
pub mod error;
pub mod introspect;
pub mod normalize;
pub mod runner;
pub mod sync;
pub mod tasks;

pub use context::MigrationContext;
pub use error::MigrateError;
pub use normalize::{denormalize_editable_field, normalize_editable_field};
pub use runner::{
    ledger_ddl, AppliedMigration, DownFn, Downgrade, HashGuard, HashWarning, Migration,
    MigrationFuture, MigrationStatus, RunReport, Runner, LEDGER_TABLE,
};
pub use sync::SyncReport;
pub use tasks::{BackgroundTasks, TaskOutcome};
