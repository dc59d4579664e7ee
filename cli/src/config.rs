//! CLI configuration.
//!
//! Settings come from `driftway.toml` in the working directory, falling
//! back to the user config dir, with flags and `DATABASE_URL` overriding
//! file values.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migrate: MigrateConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrateConfig {
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,
    /// Strictness of the accepts-schema-hash check: strict | warn | off.
    #[serde(default = "default_hash_guard")]
    pub hash_guard: String,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            hash_guard: default_hash_guard(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default = "default_schema_file")]
    pub file: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            file: default_schema_file(),
        }
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_hash_guard() -> String {
    "warn".to_string()
}

fn default_schema_file() -> PathBuf {
    PathBuf::from("schema.json")
}

impl Config {
    /// Load configuration. An explicit path must exist; otherwise
    /// `./driftway.toml` and the user config dir are tried in order, and a
    /// missing file just means defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::parse_file(path);
        }
        let local = Path::new("driftway.toml");
        if local.exists() {
            return Self::parse_file(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("driftway").join("driftway.toml");
            if user.exists() {
                return Self::parse_file(&user);
            }
        }
        Ok(Self::default())
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.migrate.dir, PathBuf::from("migrations"));
        assert_eq!(config.migrate.hash_guard, "warn");
        assert_eq!(config.schema.file, PathBuf::from("schema.json"));
        assert!(config.database.url.is_none());
    }

    #[test]
    fn full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [database]
            url = "postgres://postgres@localhost/forum"

            [migrate]
            dir = "db/migrations"
            hash_guard = "strict"

            [schema]
            file = "db/schema.json"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://postgres@localhost/forum")
        );
        assert_eq!(config.migrate.dir, PathBuf::from("db/migrations"));
        assert_eq!(config.migrate.hash_guard, "strict");
        assert_eq!(config.schema.file, PathBuf::from("db/schema.json"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[migrate]\nstrictness = \"warn\"").is_err());
    }
}
