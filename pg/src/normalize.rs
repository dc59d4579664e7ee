//! Editable-field normalization.
//!
//! Rich-text fields live either inline (a JSONB column on the parent row)
//! or normalized (rows in the Revisions table, linked through a
//! `<field>_latest` pointer). Product history moves fields between the two
//! representations more than once, so each direction is the exact inverse
//! of the other: `normalize` then `denormalize` restores content equivalent
//! to the original, modulo JSON formatting.
//!
//! Both operations are single set-based statements, not per-row loops;
//! these run against tables with millions of rows.

use driftway_core::{ddl, quote_ident, SchemaRegistry, Statement};

use crate::context::MigrationContext;
use crate::error::MigrateError;

/// SQL expression producing a fresh 17-character document id, matching the
/// application's id alphabet closely enough for migration-created rows.
const NEW_ID_EXPR: &str = "substr(md5(random()::text || clock_timestamp()::text), 1, 17)";

fn latest_column(field: &str) -> String {
    format!("{field}_latest")
}

/// Move inline JSON content into the Revisions table.
///
/// For every parent row whose source column is non-null and not yet linked,
/// inserts one revision row and points `"<field>_latest"` at it. With
/// `drop_source` the inline column is dropped afterwards. Returns the
/// number of parent rows linked.
pub async fn normalize_editable_field(
    ctx: &mut MigrationContext,
    registry: &SchemaRegistry,
    collection_name: &str,
    field: &str,
    drop_source: bool,
) -> Result<u64, MigrateError> {
    let collection = registry.collection(collection_name)?;
    let descriptor = collection.require_field(field)?;
    if !descriptor.editable {
        return Err(driftway_core::CoreError::NotEditable {
            collection: collection_name.to_string(),
            field: field.to_string(),
        }
        .into());
    }

    // The Revisions table and the pointer column may already exist from an
    // earlier pass; both creates are guarded.
    ctx.execute(&ddl::create_table(&SchemaRegistry::revisions()))
        .await?;
    ctx.execute(&Statement::new(format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} VARCHAR(27)",
        quote_ident(collection_name),
        quote_ident(&latest_column(field)),
    )))
    .await?;

    let table = quote_ident(collection_name);
    let source = quote_ident(field);
    let latest = quote_ident(&latest_column(field));
    let moved = ctx
        .execute(&Statement::with_args(
            format!(
                "WITH moved AS (
  INSERT INTO \"Revisions\" (\"_id\", \"documentId\", \"collectionName\", \"fieldName\", \"originalContents\", \"version\", \"editedAt\")
  SELECT {NEW_ID_EXPR}, p.\"_id\", $1, $2, p.{source}, '1.0.0', NOW()
  FROM {table} p
  WHERE p.{source} IS NOT NULL AND p.{latest} IS NULL
  RETURNING \"_id\", \"documentId\"
)
UPDATE {table} p SET {latest} = moved.\"_id\" FROM moved WHERE p.\"_id\" = moved.\"documentId\""
            ),
            [collection_name.to_string(), field.to_string()],
        ))
        .await?;

    if drop_source {
        ctx.execute(&Statement::new(format!(
            "ALTER TABLE {table} DROP COLUMN IF EXISTS {source}"
        )))
        .await?;
    }

    tracing::info!(
        collection = collection_name,
        field,
        rows = moved,
        "normalized editable field"
    );
    Ok(moved)
}

/// Copy the latest linked revision's content back onto the parent row's
/// inline column, re-adding the column if a previous normalization dropped
/// it. Revision rows are left in place. Returns the number of parent rows
/// updated.
pub async fn denormalize_editable_field(
    ctx: &mut MigrationContext,
    registry: &SchemaRegistry,
    collection_name: &str,
    field: &str,
) -> Result<u64, MigrateError> {
    let collection = registry.collection(collection_name)?;
    let descriptor = collection.require_field(field)?;
    if !descriptor.editable {
        return Err(driftway_core::CoreError::NotEditable {
            collection: collection_name.to_string(),
            field: field.to_string(),
        }
        .into());
    }

    ctx.execute(&Statement::new(format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote_ident(collection_name),
        quote_ident(field),
        descriptor.field_type.to_sql(),
    )))
    .await?;

    let table = quote_ident(collection_name);
    let source = quote_ident(field);
    let latest = quote_ident(&latest_column(field));
    let updated = ctx
        .execute(&Statement::with_args(
            format!(
                "UPDATE {table} p SET {source} = r.\"originalContents\"
FROM \"Revisions\" r
WHERE r.\"_id\" = p.{latest} AND r.\"collectionName\" = $1 AND r.\"fieldName\" = $2"
            ),
            [collection_name.to_string(), field.to_string()],
        ))
        .await?;

    tracing::info!(
        collection = collection_name,
        field,
        rows = updated,
        "denormalized editable field"
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::latest_column;

    #[test]
    fn latest_column_naming() {
        assert_eq!(latest_column("contents"), "contents_latest");
        assert_eq!(latest_column("moderationGuidelines"), "moderationGuidelines_latest");
    }
}
