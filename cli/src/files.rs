//! File-backed migrations.
//!
//! Migration files live in the migrations directory as
//! `<UTCtimestamp>_<description>.up.sql`, with an optional `.down.sql`
//! sibling. The file name defines execution order. Directives ride in SQL
//! comments at the top of the up file:
//!
//! ```sql
//! -- driftway:accepts-schema-hash 3c4b61e8a3f0d1a4b7c0ffee00112233
//! ALTER TABLE "Posts" ADD COLUMN IF NOT EXISTS "tocTitle" TEXT;
//! ```

use std::path::Path;

use anyhow::{Context, Result};

use driftway_core::{content_hash, Statement};
use driftway_pg::{Downgrade, Migration, MigrationContext, MigrationFuture};

pub const UP_SUFFIX: &str = ".up.sql";
pub const DOWN_SUFFIX: &str = ".down.sql";

const HASH_DIRECTIVE: &str = "-- driftway:accepts-schema-hash";

/// One `.up.sql` file (plus optional `.down.sql`) as a runnable migration.
pub struct FileMigration {
    name: String,
    up_sql: String,
    down_sql: Option<String>,
    accepts_schema_hash: Option<String>,
    checksum: String,
}

impl FileMigration {
    pub fn new(name: impl Into<String>, up_sql: impl Into<String>, down_sql: Option<String>) -> Self {
        let up_sql = up_sql.into();
        Self {
            accepts_schema_hash: parse_hash_directive(&up_sql),
            checksum: content_hash(&up_sql),
            name: name.into(),
            up_sql,
            down_sql,
        }
    }

    pub fn reversible(&self) -> bool {
        self.down_sql.is_some()
    }
}

impl Migration for FileMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_schema_hash(&self) -> Option<&str> {
        self.accepts_schema_hash.as_deref()
    }

    fn checksum(&self) -> Option<String> {
        Some(self.checksum.clone())
    }

    fn up<'c>(&'c self, ctx: &'c mut MigrationContext) -> MigrationFuture<'c> {
        Box::pin(async move {
            ctx.execute_raw(&self.up_sql).await?;
            Ok(())
        })
    }

    fn down(&self) -> Downgrade {
        match &self.down_sql {
            Some(sql) => Downgrade::Sql(vec![Statement::new(sql.clone())]),
            None => Downgrade::Irreversible,
        }
    }
}

/// Pull the `accepts-schema-hash` directive out of leading SQL comments.
fn parse_hash_directive(sql: &str) -> Option<String> {
    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix(HASH_DIRECTIVE) {
            let hash = rest.trim();
            if !hash.is_empty() {
                return Some(hash.to_string());
            }
        }
        if !trimmed.starts_with("--") {
            // Directives only count in the leading comment block.
            break;
        }
    }
    None
}

/// Load every migration in the directory, sorted by file name.
pub fn scan_migrations(dir: &Path) -> Result<Vec<FileMigration>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read migrations directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(UP_SUFFIX))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut migrations = Vec::with_capacity(entries.len());
    for entry in entries {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let name = file_name
            .strip_suffix(UP_SUFFIX)
            .unwrap_or(&file_name)
            .to_string();

        let up_sql = std::fs::read_to_string(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;

        let down_path = dir.join(format!("{name}{DOWN_SUFFIX}"));
        let down_sql = if down_path.exists() {
            Some(
                std::fs::read_to_string(&down_path)
                    .with_context(|| format!("failed to read {}", down_path.display()))?,
            )
        } else {
            None
        };

        migrations.push(FileMigration::new(name, up_sql, down_sql));
    }
    Ok(migrations)
}
