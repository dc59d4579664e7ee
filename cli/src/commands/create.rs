//! Migration creation.

use anyhow::Result;
use colored::*;

use crate::config::Config;
use crate::files::{DOWN_SUFFIX, UP_SUFFIX};

/// Scaffold a timestamped `.up.sql` / `.down.sql` pair.
pub fn migrate_create(config: &Config, name: &str) -> Result<()> {
    println!("{}", "📝 Creating migration".cyan().bold());
    println!();

    let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let slug = slugify(name);
    let base = format!("{timestamp}_{slug}");

    let dir = &config.migrate.dir;
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        println!("  Created {} directory", dir.display().to_string().yellow());
    }

    let up_path = dir.join(format!("{base}{UP_SUFFIX}"));
    let up_content = format!(
        "-- Migration: {name}\n\
         -- Optionally pin the schema this migration was written against:\n\
         -- run `driftway hash` and add a line `-- driftway:accepts-schema-hash <value>`.\n\n"
    );
    std::fs::write(&up_path, up_content)?;
    println!("  {} {}", "✓ Created:".green(), up_path.display());

    let down_path = dir.join(format!("{base}{DOWN_SUFFIX}"));
    let down_content = format!(
        "-- Rollback for {name}.\n\
         -- Delete this file to mark the migration irreversible.\n\n"
    );
    std::fs::write(&down_path, down_content)?;
    println!("  {} {}", "✓ Created:".green(), down_path.display());

    println!();
    println!("  Edit the files, then run:");
    println!("    {}", "driftway migrate up".cyan());

    Ok(())
}

/// Lowercase, `[a-z0-9_]` only, so file names stay portable.
fn slugify(name: &str) -> String {
    let mut slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while slug.contains("__") {
        slug = slug.replace("__", "_");
    }
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("Add ToC title"), "add_toc_title");
        assert_eq!(slugify("books: add toc-title!"), "books_add_toc_title");
        assert_eq!(slugify("already_fine"), "already_fine");
    }
}
