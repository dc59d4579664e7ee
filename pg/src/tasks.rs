//! Background statement execution.
//!
//! Migrations run strictly sequentially; the one sanctioned escape is
//! queueing an index build on the pool connection so it runs outside the
//! migration's transaction and is never awaited by the migration itself.
//! The queue is explicit and drainable: `drain()` is the barrier that lets
//! operational tooling verify every queued build actually finished, rather
//! than detaching a promise and hoping.

use std::sync::{Arc, Mutex};

use sqlx::PgPool;
use tokio::task::JoinSet;

use driftway_core::Statement;

use crate::error::MigrateError;

/// Result of one background statement.
#[derive(Debug)]
pub struct TaskOutcome {
    pub label: String,
    pub result: Result<u64, MigrateError>,
}

/// Shared handle to the set of in-flight background statements.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    set: Arc<Mutex<JoinSet<TaskOutcome>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a statement for execution on the pool, outside any transaction.
    /// Ordering guarantee: eventually, not necessarily before the enclosing
    /// migration commits.
    pub fn queue(&self, pool: PgPool, label: impl Into<String>, statement: Statement) {
        let label = label.into();
        let mut set = self.set.lock().expect("background task set poisoned");
        set.spawn(async move {
            tracing::debug!(task = %label, "executing background statement");
            let result = execute_on_pool(&pool, &statement).await;
            if let Err(error) = &result {
                tracing::error!(task = %label, %error, "background statement failed");
            }
            TaskOutcome { label, result }
        });
    }

    /// Number of statements still queued or running.
    pub fn in_flight(&self) -> usize {
        self.set.lock().expect("background task set poisoned").len()
    }

    /// Wait for every queued statement and collect per-task results.
    pub async fn drain(&self) -> Vec<TaskOutcome> {
        let mut set = {
            let mut guard = self.set.lock().expect("background task set poisoned");
            std::mem::take(&mut *guard)
        };
        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_error) => outcomes.push(TaskOutcome {
                    label: "<panicked>".to_string(),
                    result: Err(MigrateError::Background(join_error.to_string())),
                }),
            }
        }
        outcomes
    }
}

async fn execute_on_pool(pool: &PgPool, statement: &Statement) -> Result<u64, MigrateError> {
    let mut query = sqlx::query(&statement.sql);
    for arg in &statement.args {
        query = query.bind(arg);
    }
    Ok(query.execute(pool).await?.rows_affected())
}
