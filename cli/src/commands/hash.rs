//! Schema hash printing.

use anyhow::{Context, Result};

use driftway_pg::introspect;

use crate::config::Config;
use crate::util;

/// Print the schema hash migration authors pin with
/// `-- driftway:accepts-schema-hash`. Live by default; `--declared` hashes
/// the registry instead (the two are not comparable to each other).
pub async fn hash(config: &Config, url: Option<&str>, declared: bool) -> Result<()> {
    let value = if declared {
        let registry = util::load_registry(&config.schema.file)?;
        registry.snapshot().hash()
    } else {
        let url = url.context("a database URL is required to hash the live schema")?;
        let pool = util::connect(url).await?;
        let mut conn = pool.acquire().await?;
        introspect::snapshot(&mut conn).await?.hash()
    };
    println!("{value}");
    Ok(())
}
