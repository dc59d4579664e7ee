//! Schema snapshots and content hashing.
//!
//! A [`SchemaSnapshot`] is a canonical, ordered description of a schema
//! state. The runner hashes the live snapshot before each migration and
//! compares it against the migration's `accepts_schema_hash` precondition;
//! `driftway hash` prints the same value so migration authors can pin the
//! schema state they wrote against.

use serde::{Deserialize, Serialize};

use crate::descriptor::{SchemaRegistry, ID_FIELD};

/// One column as observed (live) or declared (registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub name: String,
    /// Lowercased type name; live snapshots carry the catalog's `udt_name`,
    /// declared snapshots the rendered DDL type. The two spellings are not
    /// interchangeable; hash guards always compare live against live.
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// One table, columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnSnapshot>,
}

/// A full schema state, tables sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSnapshot>,
}

impl SchemaSnapshot {
    pub fn new(mut tables: Vec<TableSnapshot>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Self { tables }
    }

    /// Canonical line-oriented rendering, the input to [`Self::hash`].
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str("table ");
            out.push_str(&table.name);
            out.push('\n');
            for column in &table.columns {
                out.push_str("  ");
                out.push_str(&column.name);
                out.push(' ');
                out.push_str(&column.data_type);
                out.push(' ');
                out.push_str(if column.nullable { "null" } else { "notnull" });
                if let Some(default) = &column.default {
                    out.push_str(" default ");
                    out.push_str(default);
                }
                out.push('\n');
            }
        }
        out
    }

    /// md5 hex of the canonical rendering.
    pub fn hash(&self) -> String {
        content_hash(&self.canonical())
    }
}

/// md5 hex of arbitrary content (migration SQL checksums, snapshot hashes).
pub fn content_hash(content: &str) -> String {
    format!("{:x}", md5::compute(content.as_bytes()))
}

impl SchemaRegistry {
    /// Snapshot of the *declared* schema, bookkeeping columns included.
    pub fn snapshot(&self) -> SchemaSnapshot {
        let tables = self
            .collections
            .iter()
            .map(|collection| {
                let mut columns = vec![
                    ColumnSnapshot {
                        name: ID_FIELD.to_string(),
                        data_type: "varchar(27)".to_string(),
                        nullable: false,
                        default: None,
                    },
                    ColumnSnapshot {
                        name: "schemaVersion".to_string(),
                        data_type: "bigint".to_string(),
                        nullable: false,
                        default: Some("1".to_string()),
                    },
                    ColumnSnapshot {
                        name: "createdAt".to_string(),
                        data_type: "timestamptz".to_string(),
                        nullable: false,
                        default: Some("now()".to_string()),
                    },
                    ColumnSnapshot {
                        name: "legacyData".to_string(),
                        data_type: "jsonb".to_string(),
                        nullable: true,
                        default: None,
                    },
                ];
                columns.extend(collection.fields.iter().map(|field| ColumnSnapshot {
                    name: field.name.clone(),
                    data_type: field.field_type.to_sql().to_lowercase(),
                    nullable: field.nullable,
                    default: field.default.clone(),
                }));
                TableSnapshot {
                    name: collection.name.clone(),
                    columns,
                }
            })
            .collect();
        SchemaSnapshot::new(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CollectionDescriptor, FieldDescriptor, FieldType};
    use pretty_assertions::assert_eq;

    fn snapshot_of(names: &[&str]) -> SchemaSnapshot {
        SchemaSnapshot::new(
            names
                .iter()
                .map(|name| TableSnapshot {
                    name: name.to_string(),
                    columns: vec![ColumnSnapshot {
                        name: "_id".to_string(),
                        data_type: "varchar".to_string(),
                        nullable: false,
                        default: None,
                    }],
                })
                .collect(),
        )
    }

    #[test]
    fn hash_is_stable_under_table_ordering() {
        assert_eq!(
            snapshot_of(&["Users", "Posts"]).hash(),
            snapshot_of(&["Posts", "Users"]).hash()
        );
    }

    #[test]
    fn hash_changes_when_a_column_changes() {
        let a = snapshot_of(&["Posts"]);
        let mut b = a.clone();
        b.tables[0].columns[0].nullable = true;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn declared_snapshot_carries_bookkeeping_columns() {
        let registry = SchemaRegistry::new().collection_def(
            CollectionDescriptor::new("Posts")
                .field(FieldDescriptor::new("title", FieldType::Text)),
        );
        let snapshot = registry.snapshot();
        let posts = &snapshot.tables[0];
        let names: Vec<&str> = posts.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["_id", "schemaVersion", "createdAt", "legacyData", "title"]
        );
    }

    #[test]
    fn content_hash_matches_known_md5() {
        // md5("") is the canonical empty digest.
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
