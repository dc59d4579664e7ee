//! Migration status operations.

use anyhow::Result;
use colored::*;

use driftway_pg::{Migration, Runner, LEDGER_TABLE};

use crate::config::Config;
use crate::{files, util};

/// Show applied and pending migrations.
pub async fn migrate_status(config: &Config, url: &str) -> Result<()> {
    println!("{}", "📋 Migration Status".cyan().bold());
    println!();

    let pool = util::connect(url).await?;
    let runner = Runner::new(pool);

    let applied = runner.applied().await?;
    let migrations = files::scan_migrations(&config.migrate.dir)?;
    let migrations: Vec<Box<dyn Migration>> = migrations
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn Migration>)
        .collect();
    let pending = runner.pending(&migrations).await?;

    println!("  Ledger: {}", LEDGER_TABLE.green());
    println!();

    if applied.is_empty() {
        println!("  {} No migrations applied yet", "○".dimmed());
    }
    for migration in &applied {
        println!(
            "  {} {} {}",
            "✓".green(),
            migration.name,
            migration
                .applied_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .dimmed()
        );
    }
    for migration in &pending {
        println!("  {} {}", "○".yellow(), migration.name());
    }

    println!();
    println!(
        "  {} applied, {} pending",
        applied.len().to_string().green(),
        pending.len().to_string().yellow()
    );
    if !pending.is_empty() {
        println!("  Run {} to apply", "driftway migrate up".cyan());
    }

    Ok(())
}
