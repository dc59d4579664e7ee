//! Migration DOWN (rollback) operations.

use anyhow::{Context, Result};
use colored::*;

use driftway_pg::{Downgrade, Migration, Runner};

use crate::config::Config;
use crate::{files, util};

/// Revert one applied migration by name.
pub async fn migrate_down(config: &Config, url: &str, name: &str) -> Result<()> {
    println!("{} {}", "Migrating DOWN:".cyan().bold(), name.yellow());

    let migrations = files::scan_migrations(&config.migrate.dir)?;
    let migrations: Vec<Box<dyn Migration>> = migrations
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn Migration>)
        .collect();

    if let Some(migration) = migrations.iter().find(|m| m.name() == name) {
        if matches!(migration.down(), Downgrade::Irreversible) {
            anyhow::bail!(
                "{name} has no {} file and is marked irreversible",
                crate::files::DOWN_SUFFIX
            );
        }
    }

    let pool = util::connect(url).await?;
    let runner = Runner::new(pool);

    runner
        .revert(&migrations, name)
        .await
        .context("rollback halted; the failing transaction was rolled back")?;

    println!("{}", format!("✓ reverted {name}").green().bold());
    Ok(())
}
