//! Core error types.

use thiserror::Error;

/// Errors raised while compiling or evaluating an instance query.
#[derive(Debug, Error)]
pub enum Error {
    /// A type name that the catalog does not know.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A type id that the catalog does not know.
    #[error("unknown type id: {0}")]
    UnknownTypeId(i64),

    /// An attribute that is not declared on the type or any of its ancestors.
    #[error("unknown attribute: {type_name}.{attribute}")]
    UnknownAttribute {
        /// Type the attribute was looked up on.
        type_name: String,
        /// Attribute name.
        attribute: String,
    },

    /// A table that the catalog does not know.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// An attribute that maps to no physical column.
    #[error("attribute {0} has no columns")]
    NoColumns(String),

    /// A table, type or type id registered twice.
    #[error("duplicate definition: {0}")]
    DuplicateDefinition(String),

    /// A structurally invalid catalog definition.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// A selection that cannot be evaluated against the catalog.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Driver or connection failure, passed through verbatim.
    #[error("sql error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A cell whose value cannot be read as the requested type.
    #[error("cannot read column {column} of row {row_key} as {expected}: found {found}")]
    Coercion {
        /// 1-based column index within the joined row.
        column: usize,
        /// Join key of the offending row.
        row_key: String,
        /// Requested type.
        expected: &'static str,
        /// What the cell held.
        found: String,
    },

    /// Cursor misuse: reading before `next()` or after exhaustion.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// A query that exceeds the configured budget.
    #[error("query budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Catalog or configuration document that failed to parse.
    #[error("catalog parse error: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
