use driftway_core::CoreError;
use thiserror::Error;

/// Errors raised while executing migrations against Postgres.
///
/// Driver errors (schema conflicts, failed casts, `SET NOT NULL` on columns
/// holding NULLs) pass through unwrapped so callers see exactly what the
/// database rejected.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("migration {name} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("schema hash mismatch before {name}: migration accepts {expected}, live schema is {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("migration {0} is irreversible")]
    Irreversible(String),

    #[error("unknown migration: {0}")]
    UnknownMigration(String),

    #[error("migration {0} has not been applied")]
    NotApplied(String),

    #[error("background task failed: {0}")]
    Background(String),
}

impl MigrateError {
    pub(crate) fn in_migration(self, name: &str) -> Self {
        MigrateError::Failed {
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}
