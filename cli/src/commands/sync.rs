//! Schema synchronization.

use anyhow::Result;
use colored::*;

use driftway_pg::sync as pg_sync;

use crate::config::Config;
use crate::util;

/// Reconcile the declared registry against the live database: extensions,
/// missing tables and columns, index diff, custom indexes, functions.
pub async fn sync(config: &Config, url: &str) -> Result<()> {
    println!("{} {}", "Syncing schema:".cyan().bold(), url.yellow());

    let registry = util::load_registry(&config.schema.file)?;
    let pool = util::connect(url).await?;
    let mut conn = pool.acquire().await?;

    let extensions = pg_sync::install_extensions(&mut conn, &registry).await?;
    println!(
        "  {} {} extension(s) ensured",
        "✓".green(),
        extensions.extensions_installed
    );

    let statements = pg_sync::apply_schema(&mut conn, &registry).await?;
    println!("  {} {} schema statement(s) applied", "✓".green(), statements);

    let custom = pg_sync::update_custom_indexes(&mut conn, &registry).await?;
    println!(
        "  {} {} custom index(es) ensured",
        "✓".green(),
        custom.custom_indexes
    );

    let functions = pg_sync::update_functions(&mut conn, &registry).await?;
    println!(
        "  {} {} function(s) replaced",
        "✓".green(),
        functions.functions_replaced
    );

    println!();
    println!("{}", "✓ Schema in sync".green().bold());
    Ok(())
}
