//! The migration runner.
//!
//! Migrations apply strictly sequentially, each inside its own transaction,
//! in name order (names are timestamp-prefixed). A failure rolls the
//! current transaction back and halts the whole run; there is no retry and
//! no partial commit. Applied migrations are recorded in the
//! `_driftway_migrations` ledger and never re-run.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::{PgPool, Row};

use driftway_core::Statement;

use crate::context::MigrationContext;
use crate::error::MigrateError;
use crate::introspect;
use crate::tasks::{BackgroundTasks, TaskOutcome};

/// Bookkeeping table recording which migrations have been applied.
pub const LEDGER_TABLE: &str = "_driftway_migrations";

/// Bootstrap DDL for the ledger, guarded like every other create.
pub fn ledger_ddl() -> Statement {
    Statement::new(format!(
        "CREATE TABLE IF NOT EXISTS \"{LEDGER_TABLE}\" (
  \"id\" SERIAL PRIMARY KEY,
  \"name\" VARCHAR(255) NOT NULL UNIQUE,
  \"checksum\" VARCHAR(64),
  \"schemaHash\" VARCHAR(64),
  \"appliedAt\" TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"
    ))
}

/// Future type returned by migration bodies.
pub type MigrationFuture<'a> = BoxFuture<'a, Result<(), MigrateError>>;

/// Rollback body for [`Downgrade::Run`].
pub type DownFn = for<'c> fn(&'c mut MigrationContext) -> MigrationFuture<'c>;

/// How (and whether) a migration can be rolled back. The absence of a
/// rollback is a visible, typed decision: `revert` refuses an
/// [`Downgrade::Irreversible`] migration instead of silently no-opping.
pub enum Downgrade {
    /// Statements executed in order inside the rollback transaction.
    Sql(Vec<Statement>),
    /// Arbitrary rollback logic.
    Run(DownFn),
    /// Rollback was never written; forward-only from here.
    Irreversible,
}

/// One unit of schema change.
///
/// `name()` is timestamp-prefixed (`20240301120000_add_toc_title`) and
/// defines execution order. `up` runs inside a transaction owned by the
/// runner; any error aborts and rolls back.
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    /// Optimistic precondition: hash of the live schema this migration was
    /// written against. Checked per [`HashGuard`] before `up` runs.
    fn accepts_schema_hash(&self) -> Option<&str> {
        None
    }

    /// Content hash recorded in the ledger (file-backed migrations hash
    /// their SQL; code migrations may return None).
    fn checksum(&self) -> Option<String> {
        None
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c>;

    fn down(&self) -> Downgrade;
}

/// Lifecycle of one migration within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Pending,
    Running,
    Committed,
    Failed,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::Pending => write!(f, "pending"),
            MigrationStatus::Running => write!(f, "running"),
            MigrationStatus::Committed => write!(f, "committed"),
            MigrationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Strictness of the `accepts_schema_hash` precondition check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashGuard {
    /// Mismatch aborts before `up` runs.
    Strict,
    /// Mismatch is logged and reported; the migration still runs.
    #[default]
    Warn,
    /// Skip the check entirely.
    Off,
}

impl FromStr for HashGuard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(HashGuard::Strict),
            "warn" => Ok(HashGuard::Warn),
            "off" => Ok(HashGuard::Off),
            other => Err(format!("unknown hash guard mode: {other} (expected strict, warn or off)")),
        }
    }
}

/// A hash-guard mismatch that was observed but not fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashWarning {
    pub migration: String,
    pub expected: String,
    pub actual: String,
}

/// Outcome of one `Runner::run` call.
#[derive(Debug, Default)]
pub struct RunReport {
    pub applied: Vec<String>,
    pub hash_warnings: Vec<HashWarning>,
}

/// A row from the ledger.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub name: String,
    pub checksum: Option<String>,
    pub schema_hash: Option<String>,
    pub applied_at: DateTime<Utc>,
}

/// Executes migrations against one database.
pub struct Runner {
    pool: PgPool,
    guard: HashGuard,
    tasks: BackgroundTasks,
}

impl Runner {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            guard: HashGuard::default(),
            tasks: BackgroundTasks::new(),
        }
    }

    pub fn hash_guard(mut self, guard: HashGuard) -> Self {
        self.guard = guard;
        self
    }

    /// The shared background-task queue; migrations reach it through their
    /// [`MigrationContext`].
    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Create the ledger table if missing.
    pub async fn ensure_ledger(&self) -> Result<(), MigrateError> {
        sqlx::query(&ledger_ddl().sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Every ledger row, in application order.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrateError> {
        self.ensure_ledger().await?;
        let rows = sqlx::query(&format!(
            "SELECT \"name\", \"checksum\", \"schemaHash\", \"appliedAt\"
             FROM \"{LEDGER_TABLE}\" ORDER BY \"name\""
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AppliedMigration {
                    name: row.try_get("name")?,
                    checksum: row.try_get("checksum")?,
                    schema_hash: row.try_get("schemaHash")?,
                    applied_at: row.try_get("appliedAt")?,
                })
            })
            .collect()
    }

    /// The ordered subset of `migrations` not yet recorded in the ledger.
    pub async fn pending<'m>(
        &self,
        migrations: &'m [Box<dyn Migration>],
    ) -> Result<Vec<&'m dyn Migration>, MigrateError> {
        let applied: BTreeSet<String> =
            self.applied().await?.into_iter().map(|m| m.name).collect();
        let mut pending: Vec<&dyn Migration> = migrations
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| !applied.contains(m.name()))
            .collect();
        pending.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(pending)
    }

    /// Apply every pending migration in order. Stops at the first failure;
    /// the failing migration's transaction is rolled back and the error
    /// propagates with the migration's name attached.
    pub async fn run(
        &self,
        migrations: &[Box<dyn Migration>],
    ) -> Result<RunReport, MigrateError> {
        let pending = self.pending(migrations).await?;
        let mut report = RunReport::default();

        for migration in pending {
            self.run_one(migration, &mut report).await?;
        }
        Ok(report)
    }

    async fn run_one(
        &self,
        migration: &dyn Migration,
        report: &mut RunReport,
    ) -> Result<(), MigrateError> {
        let name = migration.name();

        // Live hash is taken before the transaction opens; it feeds both the
        // guard check and the ledger row.
        let live_hash = match self.guard {
            HashGuard::Off => None,
            _ => {
                let mut conn = self.pool.acquire().await?;
                Some(introspect::snapshot(&mut conn).await?.hash())
            }
        };

        if let (Some(expected), Some(actual)) = (migration.accepts_schema_hash(), &live_hash) {
            if expected != actual.as_str() {
                match self.guard {
                    HashGuard::Strict => {
                        return Err(MigrateError::HashMismatch {
                            name: name.to_string(),
                            expected: expected.to_string(),
                            actual: actual.clone(),
                        });
                    }
                    HashGuard::Warn => {
                        tracing::warn!(
                            migration = name,
                            expected,
                            actual = actual.as_str(),
                            "schema hash mismatch, running anyway"
                        );
                        report.hash_warnings.push(HashWarning {
                            migration: name.to_string(),
                            expected: expected.to_string(),
                            actual: actual.clone(),
                        });
                    }
                    HashGuard::Off => {}
                }
            }
        }

        tracing::info!(migration = name, status = %MigrationStatus::Running, "applying migration");
        let tx = self.pool.begin().await?;
        let mut ctx = MigrationContext::new(tx, self.pool.clone(), self.tasks.clone());

        match migration.up(&mut ctx).await {
            Ok(()) => {
                let record = Statement::with_args(
                    format!(
                        "INSERT INTO \"{LEDGER_TABLE}\" (\"name\", \"checksum\", \"schemaHash\")
                         VALUES ($1, $2, $3)
                         ON CONFLICT (\"name\") DO NOTHING"
                    ),
                    [
                        name.to_string(),
                        migration.checksum().unwrap_or_default(),
                        live_hash.unwrap_or_default(),
                    ],
                );
                if let Err(error) = ctx.execute(&record).await {
                    let _ = ctx.rollback().await;
                    return Err(error.in_migration(name));
                }
                ctx.commit().await?;
                tracing::info!(migration = name, status = %MigrationStatus::Committed, "migration committed");
                report.applied.push(name.to_string());
                Ok(())
            }
            Err(error) => {
                tracing::error!(migration = name, status = %MigrationStatus::Failed, %error, "migration failed, rolling back");
                let _ = ctx.rollback().await;
                Err(error.in_migration(name))
            }
        }
    }

    /// Roll back one applied migration inside its own transaction and
    /// delete its ledger row. Refuses irreversible migrations.
    pub async fn revert(
        &self,
        migrations: &[Box<dyn Migration>],
        name: &str,
    ) -> Result<(), MigrateError> {
        let migration = migrations
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| MigrateError::UnknownMigration(name.to_string()))?;

        let applied = self.applied().await?;
        if !applied.iter().any(|m| m.name == name) {
            return Err(MigrateError::NotApplied(name.to_string()));
        }

        let down = match migration.down() {
            Downgrade::Irreversible => {
                return Err(MigrateError::Irreversible(name.to_string()));
            }
            down => down,
        };

        tracing::info!(migration = name, "reverting migration");
        let tx = self.pool.begin().await?;
        let mut ctx = MigrationContext::new(tx, self.pool.clone(), self.tasks.clone());

        let result: Result<(), MigrateError> = async {
            match down {
                Downgrade::Sql(statements) => {
                    for statement in &statements {
                        ctx.execute(statement).await?;
                    }
                }
                Downgrade::Run(body) => body(&mut ctx).await?,
                Downgrade::Irreversible => unreachable!("rejected above"),
            }
            let delete = Statement::with_args(
                format!("DELETE FROM \"{LEDGER_TABLE}\" WHERE \"name\" = $1"),
                [name.to_string()],
            );
            ctx.execute(&delete).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                ctx.commit().await?;
                tracing::info!(migration = name, "revert committed");
                Ok(())
            }
            Err(error) => {
                let _ = ctx.rollback().await;
                Err(error.in_migration(name))
            }
        }
    }

    /// Barrier: wait for every queued background statement and report
    /// per-task results.
    pub async fn drain_background(&self) -> Vec<TaskOutcome> {
        self.tasks.drain().await
    }
}
