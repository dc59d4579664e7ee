use thiserror::Error;

/// Errors raised by descriptor lookups and statement builders.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("unknown field {field} on collection {collection}")]
    UnknownField { collection: String, field: String },

    #[error("field {field} on {collection} is not marked editable")]
    NotEditable { collection: String, field: String },

    #[error("index on {0} declares no columns")]
    EmptyIndex(String),

    #[error("custom index {0} must guard itself with IF NOT EXISTS")]
    UnguardedCustomIndex(String),

    #[error("function {0} must be declared with CREATE OR REPLACE FUNCTION")]
    NotReplaceableFunction(String),

    #[error("field {field} on {collection} collides with a bookkeeping column")]
    ReservedField { collection: String, field: String },

    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),
}
