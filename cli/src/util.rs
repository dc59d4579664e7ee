//! Shared CLI plumbing: connection setup and registry loading.

use std::path::Path;

use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use url::Url;

use driftway_core::SchemaRegistry;
use driftway_pg::HashGuard;

use crate::config::Config;

/// Validate the connection string and open a small pool.
pub async fn connect(url: &str) -> Result<PgPool> {
    let parsed = Url::parse(url).context("invalid database URL")?;
    match parsed.scheme() {
        "postgres" | "postgresql" => {}
        other => bail!("unsupported database scheme: {other}"),
    }
    PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))
}

/// Load the declared schema registry from the configured JSON file.
pub fn load_registry(path: &Path) -> Result<SchemaRegistry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    SchemaRegistry::from_json(&content)
        .with_context(|| format!("invalid schema file {}", path.display()))
}

/// Parse the configured hash-guard strictness.
pub fn hash_guard(config: &Config) -> Result<HashGuard> {
    config
        .migrate
        .hash_guard
        .parse::<HashGuard>()
        .map_err(|e| anyhow::anyhow!("{e} (in [migrate] hash_guard)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_non_postgres_schemes() {
        let error = connect("mysql://root@localhost/test").await.unwrap_err();
        assert!(error.to_string().contains("unsupported database scheme"));
    }

    #[test]
    fn hash_guard_comes_from_config() {
        let config: Config = toml::from_str("[migrate]\nhash_guard = \"strict\"").unwrap();
        assert_eq!(hash_guard(&config).unwrap(), HashGuard::Strict);

        let config: Config = toml::from_str("[migrate]\nhash_guard = \"loose\"").unwrap();
        assert!(hash_guard(&config).is_err());
    }
}
