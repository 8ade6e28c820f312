//! Database capabilities and the connection seam.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Transaction};
use tracing::trace;

use crate::catalog::TableDef;
use crate::error::{Error, Result};
use instaq_proto::Value;

/// Database-specific limits and id allocation.
pub trait Dialect: Send + Sync {
    /// Maximum number of expressions in one statement; `0` means unbounded.
    fn max_expressions(&self) -> usize;

    /// Allocate a fresh identifier for a new row of `table`.
    fn new_id(&self, conn: &dyn SqlConnection, table: &TableDef) -> Result<i64>;
}

/// SQLite: 1000 expressions per statement, ids allocated as `MAX(id) + 1`.
#[derive(Debug, Clone, Copy)]
pub struct SqliteDialect {
    max_expressions: usize,
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self {
            max_expressions: 1000,
        }
    }
}

impl SqliteDialect {
    /// Create the dialect with SQLite's default limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the expression limit.
    pub fn with_max_expressions(mut self, max: usize) -> Self {
        self.max_expressions = max;
        self
    }
}

impl Dialect for SqliteDialect {
    fn max_expressions(&self) -> usize {
        self.max_expressions
    }

    fn new_id(&self, conn: &dyn SqlConnection, table: &TableDef) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX({}), 0) + 1 FROM {}",
            quote_ident(&table.id_column),
            quote_ident(&table.name)
        );
        let rs = conn.fetch(&sql)?;
        rs.rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::InvalidQuery(format!("no id allocated for {}", table.name)))
    }
}

/// Rows returned by one statement, cells already converted to [`Value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSet {
    /// Number of columns.
    pub width: usize,
    /// Rows in the order the database returned them.
    pub rows: Vec<Vec<Value>>,
}

impl RawResultSet {
    /// Create a result set.
    pub fn new(width: usize, rows: Vec<Vec<Value>>) -> Self {
        Self { width, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A borrowed connection that can run a query and return every row.
pub trait SqlConnection {
    /// Execute `sql` and collect its rows.
    fn fetch(&self, sql: &str) -> Result<RawResultSet>;
}

impl SqlConnection for Connection {
    fn fetch(&self, sql: &str) -> Result<RawResultSet> {
        let mut stmt = self.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(value_from_sql))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        trace!(rows = rows.len(), width, "fetched");
        Ok(RawResultSet { width, rows })
    }
}

impl SqlConnection for Transaction<'_> {
    fn fetch(&self, sql: &str) -> Result<RawResultSet> {
        (**self).fetch(sql)
    }
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
