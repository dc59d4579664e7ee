//! Static schema descriptors.
//!
//! A [`SchemaRegistry`] is the process-wide declaration of every collection
//! (table), index, stored function and extension the application expects.
//! It is built once at startup, from code or from a JSON schema file, and
//! passed by reference into the builders, the synchronizer and the runner.
//!
//! ```
//! use driftway_core::descriptor::{CollectionDescriptor, FieldDescriptor, FieldType, IndexDescriptor};
//!
//! let posts = CollectionDescriptor::new("Posts")
//!     .field(FieldDescriptor::new("title", FieldType::Text).not_null())
//!     .field(FieldDescriptor::new("karma", FieldType::Double).default("0"))
//!     .field(FieldDescriptor::new("contents", FieldType::Jsonb).editable())
//!     .index(IndexDescriptor::new(["karma"]));
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Primary key column carried by every collection.
pub const ID_FIELD: &str = "_id";

/// Columns every collection carries regardless of its declared fields.
pub const BOOKKEEPING_FIELDS: &[&str] = &[ID_FIELD, "schemaVersion", "createdAt", "legacyData"];

/// Postgres column types used by the product schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Varchar(u32),
    Bool,
    Integer,
    BigInt,
    Double,
    Timestamptz,
    Date,
    Jsonb,
    TextArray,
    /// pgvector embedding column; requires the `vector` extension.
    Vector(u32),
}

impl FieldType {
    /// Render the DDL type.
    pub fn to_sql(self) -> String {
        match self {
            FieldType::Text => "TEXT".to_string(),
            FieldType::Varchar(len) => format!("VARCHAR({})", len),
            FieldType::Bool => "BOOL".to_string(),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Double => "DOUBLE PRECISION".to_string(),
            FieldType::Timestamptz => "TIMESTAMPTZ".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::Jsonb => "JSONB".to_string(),
            FieldType::TextArray => "TEXT[]".to_string(),
            FieldType::Vector(dim) => format!("VECTOR({})", dim),
        }
    }
}

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "nullable_default")]
    pub nullable: bool,
    /// Default-value SQL expression, e.g. `0`, `now()`, `'[]'::jsonb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Rich-text field whose content may live in the Revisions table.
    #[serde(default)]
    pub editable: bool,
}

fn nullable_default() -> bool {
    true
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            default: None,
            editable: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }
}

/// A structural index declaration. The index name derives deterministically
/// from the table and column list, so the same declaration always reconciles
/// against the same live index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Partial-index predicate (the `WHERE` clause body).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl IndexDescriptor {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            predicate: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn partial(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Derived index name: `idx_<table>_<columns>`, lowercased, kept inside
    /// Postgres's 63-byte identifier limit by truncating and appending a
    /// short content hash.
    pub fn name(&self, table: &str) -> String {
        let raw = format!(
            "idx_{}_{}",
            table.to_lowercase(),
            self.columns
                .iter()
                .map(|c| c.to_lowercase())
                .collect::<Vec<_>>()
                .join("_")
        );
        if raw.len() <= 63 {
            return raw;
        }
        let digest = format!("{:x}", md5::compute(raw.as_bytes()));
        format!("{}_{}", &raw[..55], &digest[..7])
    }
}

/// Prefix under which this collection's derived index names live. Live
/// indexes outside this namespace are never dropped by the synchronizer.
pub fn index_prefix(table: &str) -> String {
    format!("idx_{}_", table.to_lowercase())
}

/// An index expressed as raw SQL (expression or exotic partial indexes).
/// The statement must guard itself with `IF NOT EXISTS` so re-running the
/// synchronizer converges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomIndex {
    pub name: String,
    pub create_sql: String,
}

/// A stored SQL function, always reconciled by replaying its
/// `CREATE OR REPLACE FUNCTION` body wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlFunction {
    pub name: String,
    pub create_sql: String,
}

/// A logical table: name, declared fields, declared indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor, CoreError> {
        self.get_field(name).ok_or_else(|| CoreError::UnknownField {
            collection: self.name.clone(),
            field: name.to_string(),
        })
    }
}

/// The immutable, process-wide schema declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    pub collections: Vec<CollectionDescriptor>,
    #[serde(default)]
    pub custom_indexes: Vec<CustomIndex>,
    #[serde(default)]
    pub functions: Vec<SqlFunction>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection_def(mut self, collection: CollectionDescriptor) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn custom_index(mut self, index: CustomIndex) -> Self {
        self.custom_indexes.push(index);
        self
    }

    pub fn function(mut self, function: SqlFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    /// Load a registry from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let registry: Self =
            serde_json::from_str(json).map_err(|e| CoreError::InvalidSchema(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn collection(&self, name: &str) -> Result<&CollectionDescriptor, CoreError> {
        self.collections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::UnknownCollection(name.to_string()))
    }

    /// Structural sanity checks, run after loading from JSON.
    pub fn validate(&self) -> Result<(), CoreError> {
        for collection in &self.collections {
            for field in &collection.fields {
                if BOOKKEEPING_FIELDS.contains(&field.name.as_str()) {
                    return Err(CoreError::ReservedField {
                        collection: collection.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
            for index in &collection.indexes {
                if index.columns.is_empty() {
                    return Err(CoreError::EmptyIndex(collection.name.clone()));
                }
            }
        }
        for custom in &self.custom_indexes {
            if !custom.create_sql.to_uppercase().contains("IF NOT EXISTS") {
                return Err(CoreError::UnguardedCustomIndex(custom.name.clone()));
            }
        }
        for function in &self.functions {
            if !function
                .create_sql
                .to_uppercase()
                .contains("CREATE OR REPLACE FUNCTION")
            {
                return Err(CoreError::NotReplaceableFunction(function.name.clone()));
            }
        }
        Ok(())
    }

    /// The canonical Revisions collection used by the editable-field
    /// normalizer. Declared here so every registry agrees on its shape.
    pub fn revisions() -> CollectionDescriptor {
        CollectionDescriptor::new("Revisions")
            .field(FieldDescriptor::new("documentId", FieldType::Varchar(27)).not_null())
            .field(FieldDescriptor::new("collectionName", FieldType::Text).not_null())
            .field(FieldDescriptor::new("fieldName", FieldType::Text).not_null())
            .field(FieldDescriptor::new("originalContents", FieldType::Jsonb))
            .field(FieldDescriptor::new("html", FieldType::Text))
            .field(
                FieldDescriptor::new("version", FieldType::Text)
                    .not_null()
                    .default("'1.0.0'"),
            )
            .field(FieldDescriptor::new("editedAt", FieldType::Timestamptz))
            .field(FieldDescriptor::new("userId", FieldType::Varchar(27)))
            .index(IndexDescriptor::new(["documentId", "fieldName"]))
    }
}
