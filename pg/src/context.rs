//! Per-migration execution context.

use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use driftway_core::Statement;

use crate::error::MigrateError;
use crate::tasks::BackgroundTasks;

/// Handle passed into a migration's `up`/`down`.
///
/// Owns the migration's transaction; everything executed through
/// [`MigrationContext::execute`] commits or rolls back atomically with the
/// migration. [`MigrationContext::queue_background`] is the deliberate
/// escape for statements that must not hold the transaction's locks
/// (long-running index builds): they run on the pool and are tracked by the
/// runner's task queue.
pub struct MigrationContext {
    tx: Transaction<'static, Postgres>,
    pool: PgPool,
    tasks: BackgroundTasks,
}

impl MigrationContext {
    pub(crate) fn new(
        tx: Transaction<'static, Postgres>,
        pool: PgPool,
        tasks: BackgroundTasks,
    ) -> Self {
        Self { tx, pool, tasks }
    }

    /// The transactional connection, for callers that need raw sqlx access.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// The non-transactional pool handle.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Execute a statement inside the migration's transaction.
    pub async fn execute(&mut self, statement: &Statement) -> Result<u64, MigrateError> {
        let mut query = sqlx::query(&statement.sql);
        for arg in &statement.args {
            query = query.bind(arg);
        }
        Ok(query.execute(&mut *self.tx).await?.rows_affected())
    }

    /// Execute raw SQL inside the migration's transaction. Uses the simple
    /// query protocol, so a migration file may contain several
    /// `;`-separated statements.
    pub async fn execute_raw(&mut self, sql: &str) -> Result<u64, MigrateError> {
        use futures_util::TryStreamExt;
        let mut rows_affected = 0;
        let mut stream = sqlx::raw_sql(sql).execute_many(&mut *self.tx);
        while let Some(result) = stream.try_next().await? {
            rows_affected += result.rows_affected();
        }
        Ok(rows_affected)
    }

    /// Queue a statement to run on the pool, outside this transaction,
    /// without being awaited. Only ordering guarantee: eventually.
    pub fn queue_background(&self, label: impl Into<String>, statement: Statement) {
        self.tasks.queue(self.pool.clone(), label, statement);
    }

    pub(crate) async fn commit(self) -> Result<(), MigrateError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn rollback(self) -> Result<(), MigrateError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
