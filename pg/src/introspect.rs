//! Live catalog introspection.
//!
//! Reads `information_schema` / `pg_indexes` into the core snapshot types
//! so the runner can hash the live schema and the synchronizer can diff it
//! against declarations. Underscore-prefixed tables (the migration ledger
//! and friends) are infrastructure, not product schema, and are excluded
//! from snapshots.

use sqlx::{PgConnection, Row};

use driftway_core::{ColumnSnapshot, LiveIndex, SchemaSnapshot, TableSnapshot};

use crate::error::MigrateError;

/// Snapshot every public-schema table: columns in ordinal order, types
/// rendered as lowercase `udt_name` (arrays as `elem[]`, varchars with
/// their length).
pub async fn snapshot(conn: &mut PgConnection) -> Result<SchemaSnapshot, MigrateError> {
    let rows = sqlx::query(
        "SELECT table_name, column_name, udt_name, character_maximum_length, is_nullable, column_default
         FROM information_schema.columns
         WHERE table_schema = 'public' AND table_name NOT LIKE '\\_%'
         ORDER BY table_name, ordinal_position",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut tables: Vec<TableSnapshot> = Vec::new();
    for row in rows {
        let table_name: String = row.try_get("table_name")?;
        let column_name: String = row.try_get("column_name")?;
        let udt_name: String = row.try_get("udt_name")?;
        let max_length: Option<i32> = row.try_get("character_maximum_length")?;
        let is_nullable: String = row.try_get("is_nullable")?;
        let column_default: Option<String> = row.try_get("column_default")?;

        let column = ColumnSnapshot {
            name: column_name,
            data_type: render_type(&udt_name, max_length),
            nullable: is_nullable == "YES",
            default: column_default,
        };

        match tables.last_mut() {
            Some(table) if table.name == table_name => table.columns.push(column),
            _ => tables.push(TableSnapshot {
                name: table_name,
                columns: vec![column],
            }),
        }
    }

    Ok(SchemaSnapshot::new(tables))
}

/// `udt_name` to a readable type string: `_text` is an array of `text`,
/// `varchar` carries its declared length.
fn render_type(udt_name: &str, max_length: Option<i32>) -> String {
    if let Some(element) = udt_name.strip_prefix('_') {
        return format!("{}[]", element);
    }
    match max_length {
        Some(len) if udt_name == "varchar" => format!("varchar({})", len),
        _ => udt_name.to_string(),
    }
}

/// Indexes currently present on one table.
pub async fn live_indexes(
    conn: &mut PgConnection,
    table: &str,
) -> Result<Vec<LiveIndex>, MigrateError> {
    let rows = sqlx::query(
        "SELECT indexname, tablename FROM pg_indexes
         WHERE schemaname = 'public' AND tablename = $1
         ORDER BY indexname",
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(LiveIndex {
                name: row.try_get("indexname")?,
                table: row.try_get("tablename")?,
            })
        })
        .collect()
}

pub async fn table_exists(conn: &mut PgConnection, table: &str) -> Result<bool, MigrateError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = 'public' AND table_name = $1
         )",
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

pub async fn column_exists(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
) -> Result<bool, MigrateError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2
         )",
    )
    .bind(table)
    .bind(column)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::render_type;

    #[test]
    fn render_type_handles_arrays_and_varchars() {
        assert_eq!(render_type("text", None), "text");
        assert_eq!(render_type("_text", None), "text[]");
        assert_eq!(render_type("varchar", Some(27)), "varchar(27)");
        assert_eq!(render_type("timestamptz", None), "timestamptz");
    }
}
