//! Migration plan (dry-run).

use std::path::Path;

use anyhow::Result;
use colored::*;

use driftway_pg::{sync, Downgrade, Migration, Runner};

use crate::config::Config;
use crate::{files, util};

/// Preview pending migrations and the declared-vs-live reconciliation diff
/// without executing anything.
pub async fn plan(config: &Config, url: &str, output: Option<&Path>) -> Result<()> {
    println!("{}", "📋 Migration Plan (dry-run)".cyan().bold());
    println!();

    let migrations = files::scan_migrations(&config.migrate.dir)?;
    let migrations: Vec<Box<dyn Migration>> = migrations
        .into_iter()
        .map(|m| Box::new(m) as Box<dyn Migration>)
        .collect();

    let pool = util::connect(url).await?;
    let runner = Runner::new(pool.clone());
    let pending = runner.pending(&migrations).await?;

    let sync_statements = if config.schema.file.exists() {
        let registry = util::load_registry(&config.schema.file)?;
        let mut conn = pool.acquire().await?;
        sync::plan_schema(&mut conn, &registry).await?
    } else {
        Vec::new()
    };

    if pending.is_empty() && sync_statements.is_empty() {
        println!("{}", "✓ Nothing to do - database is up to date".green());
        return Ok(());
    }

    println!(
        "┌─ {} ({} pending) ─────────────────────────────────────┐",
        "MIGRATIONS".green().bold(),
        pending.len()
    );
    for (i, migration) in pending.iter().enumerate() {
        let marker = if matches!(migration.down(), Downgrade::Irreversible) {
            " (irreversible)".dimmed().to_string()
        } else {
            String::new()
        };
        println!("│ {}. {}{}", i + 1, migration.name().cyan(), marker);
    }
    println!("└──────────────────────────────────────────────────────────────┘");
    println!();

    println!(
        "┌─ {} ({} statement(s)) ─────────────────────────────────────┐",
        "SYNC".yellow().bold(),
        sync_statements.len()
    );
    for (i, statement) in sync_statements.iter().enumerate() {
        let first_line = statement.sql.lines().next().unwrap_or("");
        println!("│ {}. {}", i + 1, first_line.yellow());
    }
    println!("└──────────────────────────────────────────────────────────────┘");

    if let Some(path) = output {
        let mut content = String::new();
        content.push_str("-- Pending migrations (applied by `driftway migrate up`):\n");
        for migration in &pending {
            content.push_str(&format!("--   {}\n", migration.name()));
        }
        content.push_str("\n-- Schema sync statements (applied by `driftway sync`):\n");
        for statement in &sync_statements {
            content.push_str(&statement.sql);
            content.push_str(";\n");
        }
        std::fs::write(path, &content)?;
        println!();
        println!("{} {}", "Saved to:".green(), path.display());
    }

    println!();
    println!(
        "{} Run {} and {} to apply",
        "💡".yellow(),
        "driftway migrate up".cyan(),
        "driftway sync".cyan()
    );

    Ok(())
}
