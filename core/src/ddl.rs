//! DDL statement builders.
//!
//! Pure functions from descriptors to SQL. Every builder that creates or
//! drops an object emits an `IF NOT EXISTS` / `IF EXISTS` guard, so a run
//! interrupted mid-migration can simply be repeated: the already-applied
//! statements become no-ops instead of errors.

use crate::descriptor::{
    CollectionDescriptor, FieldDescriptor, FieldType, IndexDescriptor, ID_FIELD,
};
use crate::error::CoreError;

/// A single SQL statement plus positional text arguments.
///
/// DDL carries no arguments; the shape exists so data-bearing statements
/// (ledger inserts, normalizer backfills) bind values instead of splicing
/// them into the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(sql: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sql: sql.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column clause for CREATE TABLE / ADD COLUMN: `"name" TYPE [NOT NULL] [DEFAULT expr]`.
fn column_clause(field: &FieldDescriptor) -> String {
    let mut clause = format!("{} {}", quote_ident(&field.name), field.field_type.to_sql());
    if !field.nullable {
        clause.push_str(" NOT NULL");
    }
    if let Some(default) = &field.default {
        clause.push_str(" DEFAULT ");
        clause.push_str(default);
    }
    clause
}

/// `ALTER TABLE .. ADD COLUMN IF NOT EXISTS` for a declared field.
pub fn add_field(collection: &CollectionDescriptor, field: &str) -> Result<Statement, CoreError> {
    let descriptor = collection.require_field(field)?;
    Ok(Statement::new(format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        quote_ident(&collection.name),
        column_clause(descriptor),
    )))
}

/// `ALTER TABLE .. DROP COLUMN IF EXISTS` for a declared field.
pub fn drop_field(collection: &CollectionDescriptor, field: &str) -> Result<Statement, CoreError> {
    let descriptor = collection.require_field(field)?;
    Ok(Statement::new(format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
        quote_ident(&collection.name),
        quote_ident(&descriptor.name),
    )))
}

/// Add a column that is no longer (or not yet) part of the descriptor.
/// The raw-identifier escape hatch for migrations that resurrect dropped
/// columns; the column is always nullable.
pub fn add_removed_field(
    collection: &CollectionDescriptor,
    field: &str,
    field_type: FieldType,
) -> Statement {
    Statement::new(format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote_ident(&collection.name),
        quote_ident(field),
        field_type.to_sql(),
    ))
}

/// Drop a column that is no longer part of the descriptor.
pub fn drop_removed_field(collection: &CollectionDescriptor, field: &str) -> Statement {
    Statement::new(format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
        quote_ident(&collection.name),
        quote_ident(field),
    ))
}

/// Full `CREATE TABLE IF NOT EXISTS` from the bookkeeping columns plus all
/// declared fields.
pub fn create_table(collection: &CollectionDescriptor) -> Statement {
    let mut clauses = vec![
        format!("{} VARCHAR(27) PRIMARY KEY", quote_ident(ID_FIELD)),
        format!("{} BIGINT NOT NULL DEFAULT 1", quote_ident("schemaVersion")),
        format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quote_ident("createdAt")),
        format!("{} JSONB", quote_ident("legacyData")),
    ];
    clauses.extend(collection.fields.iter().map(column_clause));
    Statement::new(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote_ident(&collection.name),
        clauses.join(",\n  "),
    ))
}

/// `DROP TABLE IF EXISTS`.
pub fn drop_table(collection: &CollectionDescriptor) -> Statement {
    Statement::new(format!(
        "DROP TABLE IF EXISTS {}",
        quote_ident(&collection.name)
    ))
}

/// `ALTER COLUMN .. SET DEFAULT` from the *current* declared default, or
/// `DROP DEFAULT` when the descriptor no longer declares one. Re-running
/// after a descriptor change picks up the new default; existing rows are
/// never backfilled.
pub fn update_default_value(
    collection: &CollectionDescriptor,
    field: &str,
) -> Result<Statement, CoreError> {
    let descriptor = collection.require_field(field)?;
    let sql = match &descriptor.default {
        Some(default) => format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            quote_ident(&collection.name),
            quote_ident(&descriptor.name),
            default,
        ),
        None => format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
            quote_ident(&collection.name),
            quote_ident(&descriptor.name),
        ),
    };
    Ok(Statement::new(sql))
}

/// `ALTER COLUMN .. DROP DEFAULT`.
pub fn drop_default_value(
    collection: &CollectionDescriptor,
    field: &str,
) -> Result<Statement, CoreError> {
    let descriptor = collection.require_field(field)?;
    Ok(Statement::new(format!(
        "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
        quote_ident(&collection.name),
        quote_ident(&descriptor.name),
    )))
}

/// `ALTER COLUMN .. TYPE .. USING <expr>`. The cast expression defaults to
/// `"column"::<type>`; pass an explicit `using` when Postgres cannot infer
/// the conversion (e.g. `text` holding serialized arrays).
pub fn update_field_type(
    collection: &CollectionDescriptor,
    field: &str,
    using: Option<&str>,
) -> Result<Statement, CoreError> {
    let descriptor = collection.require_field(field)?;
    let type_sql = descriptor.field_type.to_sql();
    let cast = match using {
        Some(expr) => expr.to_string(),
        None => format!("{}::{}", quote_ident(&descriptor.name), type_sql),
    };
    Ok(Statement::new(format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}",
        quote_ident(&collection.name),
        quote_ident(&descriptor.name),
        type_sql,
        cast,
    )))
}

/// `ALTER COLUMN .. DROP NOT NULL`.
pub fn make_column_nullable(
    collection: &CollectionDescriptor,
    field: &str,
) -> Result<Statement, CoreError> {
    let descriptor = collection.require_field(field)?;
    Ok(Statement::new(format!(
        "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
        quote_ident(&collection.name),
        quote_ident(&descriptor.name),
    )))
}

/// `ALTER COLUMN .. SET NOT NULL`. Existing NULLs make Postgres reject the
/// statement; that driver error propagates unwrapped.
pub fn make_column_not_nullable(
    collection: &CollectionDescriptor,
    field: &str,
) -> Result<Statement, CoreError> {
    let descriptor = collection.require_field(field)?;
    Ok(Statement::new(format!(
        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
        quote_ident(&collection.name),
        quote_ident(&descriptor.name),
    )))
}

/// `CREATE [UNIQUE] INDEX IF NOT EXISTS` from a structural descriptor.
pub fn create_index(
    collection: &CollectionDescriptor,
    index: &IndexDescriptor,
) -> Result<Statement, CoreError> {
    if index.columns.is_empty() {
        return Err(CoreError::EmptyIndex(collection.name.clone()));
    }
    let unique = if index.unique { "UNIQUE " } else { "" };
    let columns = index
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        unique,
        quote_ident(&index.name(&collection.name)),
        quote_ident(&collection.name),
        columns,
    );
    if let Some(predicate) = &index.predicate {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    Ok(Statement::new(sql))
}

/// `DROP INDEX IF EXISTS` keyed by the structural descriptor's derived name.
pub fn drop_index(
    collection: &CollectionDescriptor,
    index: &IndexDescriptor,
) -> Result<Statement, CoreError> {
    if index.columns.is_empty() {
        return Err(CoreError::EmptyIndex(collection.name.clone()));
    }
    Ok(drop_index_by_name(&index.name(&collection.name)))
}

/// `DROP INDEX IF EXISTS` keyed by a literal name. Needed for legacy
/// indexes whose generated name no longer matches current naming rules.
pub fn drop_index_by_name(name: &str) -> Statement {
    Statement::new(format!("DROP INDEX IF EXISTS {}", quote_ident(name)))
}

/// `CREATE EXTENSION IF NOT EXISTS`.
pub fn install_extension(name: &str) -> Statement {
    Statement::new(format!(
        "CREATE EXTENSION IF NOT EXISTS {}",
        quote_ident(name)
    ))
}
