//! instaq core - instance-attribute query resolution and access-filtered
//! evaluation over SQL.
//!
//! Given root instances and a selection tree, the engine
//!
//! 1. resolves every selected attribute to its table and columns through the
//!    [`Catalog`],
//! 2. compiles one batched `SELECT ... WHERE key IN (...)` per physical table,
//! 3. merges the result sets into joined rows keyed by instance id,
//! 4. regroups linkfrom and multi-line results per parent,
//! 5. applies an [`AccessOracle`](security::AccessOracle) once per evaluation,
//!
//! and exposes the outcome through the [`Evaluator`] cursor.
//!
//! ```no_run
//! use instaq_core::{Catalog, QueryExecutor, SqliteDialect};
//! use instaq_core::proto::{InstanceQuery, Selection};
//! use instaq_core::security::AllowAll;
//!
//! # fn run(conn: &rusqlite::Connection, catalog: &Catalog) -> instaq_core::Result<()> {
//! let dialect = SqliteDialect::new();
//! let executor = QueryExecutor::new(catalog, &dialect);
//! let query = InstanceQuery::new("Document")
//!     .with_ids([114, 224])
//!     .select(Selection::attribute("Name").with_alias("name"));
//!
//! let mut rows = executor.evaluate(conn, &query, &AllowAll)?;
//! while rows.next() {
//!     println!("{} {:?}", rows.inst()?, rows.get_alias("name")?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod dialect;
pub mod error;
pub mod query;
pub mod security;

pub use catalog::{
    AttributeDef, AttributeKind, Catalog, CatalogDef, Composer, ScalarType, TableDef, TypeDef,
};
pub use config::{EngineConfig, QueryBudget};
pub use dialect::{Dialect, RawResultSet, SqlConnection, SqliteDialect};
pub use error::{Error, Result};
pub use query::{ColumnRef, CursorState, Evaluator, QueryExecutor};

/// Re-export protocol types.
pub use instaq_proto as proto;
