//! Migration UP operations.

use anyhow::{Context, Result};
use colored::*;

use driftway_pg::{Migration, Runner};

use crate::config::Config;
use crate::{files, util};

/// Apply all pending migration files, each in its own transaction.
pub async fn migrate_up(config: &Config, url: &str) -> Result<()> {
    println!("{} {}", "Migrating UP:".cyan().bold(), url.yellow());

    let migrations = files::scan_migrations(&config.migrate.dir)?;
    if migrations.is_empty() {
        println!(
            "{} No migration files in {}",
            "!".yellow(),
            config.migrate.dir.display()
        );
        return Ok(());
    }
    let migrations: Vec<Box<dyn Migration>> = migrations
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn Migration>)
        .collect();

    let pool = util::connect(url).await?;
    let runner = Runner::new(pool).hash_guard(util::hash_guard(config)?);

    let pending = runner.pending(&migrations).await?;
    if pending.is_empty() {
        println!("{}", "No migrations to apply.".green());
        return Ok(());
    }

    println!("{} {} migration(s) to apply", "Found:".cyan(), pending.len());
    for (i, migration) in pending.iter().enumerate() {
        println!(
            "  {} {}",
            format!("[{}/{}]", i + 1, pending.len()).cyan(),
            migration.name().yellow()
        );
    }

    let report = runner
        .run(&migrations)
        .await
        .context("migration halted; the failing transaction was rolled back")?;

    for warning in &report.hash_warnings {
        println!(
            "  {} {} expects schema {}, live schema is {}",
            "⚠".yellow(),
            warning.migration.yellow(),
            warning.expected.dimmed(),
            warning.actual.dimmed()
        );
    }

    println!(
        "{}",
        format!("✓ {} migration(s) applied", report.applied.len())
            .green()
            .bold()
    );

    // Index builds queued outside the migration transactions: wait and
    // surface per-task results so nothing fails silently.
    let outcomes = runner.drain_background().await;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(_) => println!("  {} background task {} finished", "✓".green(), outcome.label),
            Err(error) => println!(
                "  {} background task {} failed: {}",
                "✗".red(),
                outcome.label,
                error
            ),
        }
    }
    if outcomes.iter().any(|o| o.result.is_err()) {
        anyhow::bail!("one or more background tasks failed");
    }

    Ok(())
}
