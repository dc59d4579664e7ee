//! Declared-vs-live reconciliation.
//!
//! Indexes are diffed structurally (create what is declared and missing,
//! drop what sits in the collection's naming namespace but is no longer
//! declared). Stored functions are never diffed: every declared
//! `CREATE OR REPLACE FUNCTION` is replayed wholesale. Extensions and
//! custom (raw SQL) indexes are created if absent.
//!
//! All entry points take `&mut PgConnection`, so they run equally inside a
//! migration's transaction (via `MigrationContext::conn`) or on a pooled
//! connection from the CLI.

use sqlx::{PgConnection, PgPool};

use driftway_core::{
    diff_indexes, CollectionDescriptor, IndexPlan, SchemaRegistry, Statement,
};

use crate::error::MigrateError;
use crate::introspect;
use crate::tasks::BackgroundTasks;

/// What one `sync` pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub indexes_created: usize,
    pub indexes_dropped: usize,
    pub custom_indexes: usize,
    pub functions_replaced: usize,
    pub extensions_installed: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.indexes_created += other.indexes_created;
        self.indexes_dropped += other.indexes_dropped;
        self.custom_indexes += other.custom_indexes;
        self.functions_replaced += other.functions_replaced;
        self.extensions_installed += other.extensions_installed;
    }
}

async fn execute(conn: &mut PgConnection, statement: &Statement) -> Result<u64, MigrateError> {
    let mut query = sqlx::query(&statement.sql);
    for arg in &statement.args {
        query = query.bind(arg);
    }
    Ok(query.execute(&mut *conn).await?.rows_affected())
}

/// Compute the reconciliation plan for one collection without executing it.
pub async fn plan_indexes(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
    collection: &CollectionDescriptor,
) -> Result<IndexPlan, MigrateError> {
    let live = introspect::live_indexes(conn, &collection.name).await?;
    Ok(diff_indexes(collection, &registry.custom_indexes, &live)?)
}

/// Reconcile one collection's declared indexes against the live table.
/// Running this twice in a row issues zero statements the second time.
pub async fn update_indexes(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
    collection: &CollectionDescriptor,
) -> Result<SyncReport, MigrateError> {
    let plan = plan_indexes(conn, registry, collection).await?;
    for statement in &plan.create {
        tracing::debug!(table = %collection.name, sql = %statement.sql, "creating index");
        execute(conn, statement).await?;
    }
    for statement in &plan.drop {
        tracing::debug!(table = %collection.name, sql = %statement.sql, "dropping index");
        execute(conn, statement).await?;
    }
    Ok(SyncReport {
        indexes_created: plan.create.len(),
        indexes_dropped: plan.drop.len(),
        ..SyncReport::default()
    })
}

/// Reconcile every collection in the registry.
pub async fn update_all_indexes(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
) -> Result<SyncReport, MigrateError> {
    let mut report = SyncReport::default();
    for collection in &registry.collections {
        report.merge(update_indexes(conn, registry, collection).await?);
    }
    Ok(report)
}

/// Execute every declared raw-SQL index synchronously. The statements are
/// self-guarding (`IF NOT EXISTS`, enforced by registry validation), so
/// re-running converges.
pub async fn update_custom_indexes(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
) -> Result<SyncReport, MigrateError> {
    for custom in &registry.custom_indexes {
        tracing::debug!(index = %custom.name, "ensuring custom index");
        execute(conn, &Statement::new(custom.create_sql.clone())).await?;
    }
    Ok(SyncReport {
        custom_indexes: registry.custom_indexes.len(),
        ..SyncReport::default()
    })
}

/// Queue every declared raw-SQL index on the background task queue instead
/// of building inside the caller's transaction. Long index builds on large
/// tables hold locks; this trades "index exists when the migration commits"
/// for not holding them.
pub fn queue_custom_indexes(
    tasks: &BackgroundTasks,
    pool: &PgPool,
    registry: &SchemaRegistry,
) -> usize {
    for custom in &registry.custom_indexes {
        tasks.queue(
            pool.clone(),
            format!("custom-index:{}", custom.name),
            Statement::new(custom.create_sql.clone()),
        );
    }
    registry.custom_indexes.len()
}

/// Replay every declared stored function. `CREATE OR REPLACE` makes this
/// idempotent; functions are replaced wholesale, never structurally diffed.
pub async fn update_functions(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
) -> Result<SyncReport, MigrateError> {
    for function in &registry.functions {
        tracing::debug!(function = %function.name, "replacing function");
        execute(conn, &Statement::new(function.create_sql.clone())).await?;
    }
    Ok(SyncReport {
        functions_replaced: registry.functions.len(),
        ..SyncReport::default()
    })
}

/// The full declared-vs-live reconciliation plan: missing tables, missing
/// columns, then the index diff for every collection. Dry-run counterpart
/// of [`apply_schema`].
pub async fn plan_schema(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
) -> Result<Vec<Statement>, MigrateError> {
    let snapshot = introspect::snapshot(conn).await?;
    let mut statements = Vec::new();

    for collection in &registry.collections {
        match snapshot.tables.iter().find(|t| t.name == collection.name) {
            None => statements.push(driftway_core::ddl::create_table(collection)),
            Some(table) => {
                for field in &collection.fields {
                    if !table.columns.iter().any(|c| c.name == field.name) {
                        statements.push(driftway_core::ddl::add_field(collection, &field.name)?);
                    }
                }
            }
        }
        let plan = plan_indexes(conn, registry, collection).await?;
        statements.extend(plan.create);
        statements.extend(plan.drop);
    }

    Ok(statements)
}

/// Execute the [`plan_schema`] statements; returns how many ran.
pub async fn apply_schema(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
) -> Result<usize, MigrateError> {
    let statements = plan_schema(conn, registry).await?;
    for statement in &statements {
        tracing::debug!(sql = %statement.sql, "applying schema statement");
        execute(conn, statement).await?;
    }
    Ok(statements.len())
}

/// `CREATE EXTENSION IF NOT EXISTS` for every required extension.
pub async fn install_extensions(
    conn: &mut PgConnection,
    registry: &SchemaRegistry,
) -> Result<SyncReport, MigrateError> {
    for extension in &registry.extensions {
        tracing::debug!(extension = %extension, "ensuring extension");
        execute(conn, &driftway_core::ddl::install_extension(extension)).await?;
    }
    Ok(SyncReport {
        extensions_installed: registry.extensions.len(),
        ..SyncReport::default()
    })
}
