//! Shared fixture: a small document schema in SQLite.
//!
//! ```text
//! Document 114 -> Company 115 -> Person 116 <- Position 215, 315, 415
//! Document 224 -> Company 225 -> Person 226
//! Document 334 -> Company 335 -> Person 336
//! ```

#![allow(dead_code)]

use std::cell::RefCell;

use instaq_core::proto::InstanceQuery;
use instaq_core::security::AccessOracle;
use instaq_core::{Catalog, Evaluator, QueryExecutor, RawResultSet, Result, SqlConnection, SqliteDialect};
use rusqlite::Connection;

pub const SCHEMA: &str = r#"
CREATE TABLE T_DOCUMENT (ID INTEGER PRIMARY KEY, NAME TEXT, COMPANY_ID INTEGER);
CREATE TABLE T_DOCUMENT_EXT (ID INTEGER PRIMARY KEY, NOTE TEXT);
CREATE TABLE T_TAG (ID INTEGER PRIMARY KEY, DOC_ID INTEGER, TAG TEXT);
CREATE TABLE T_COMPANY (ID INTEGER PRIMARY KEY, NAME TEXT, CONTACT_ID INTEGER);
CREATE TABLE T_PERSON (ID INTEGER PRIMARY KEY, NAME TEXT, AGE INTEGER);
CREATE TABLE T_POSITION (ID INTEGER PRIMARY KEY, TYPE_ID INTEGER, PERSON_ID INTEGER,
                         QTY INTEGER, TOTAL REAL);

INSERT INTO T_DOCUMENT VALUES (114, 'Doc A', 115), (224, 'Doc B', 225), (334, 'Doc C', 335);
INSERT INTO T_DOCUMENT_EXT VALUES (114, 'first'), (224, 'second');
INSERT INTO T_TAG VALUES (1, 114, 'red'), (2, 114, 'blue'), (3, 224, 'green');
INSERT INTO T_COMPANY VALUES (115, 'Acme', 116), (225, 'Globex', 226), (335, 'Initech', 336);
INSERT INTO T_PERSON VALUES (116, 'Ada', '36'), (226, 'Bob', 41), (336, 'Cy', 'unknown');
INSERT INTO T_POSITION VALUES (215, 4, 116, 1, 10.0), (315, 4, 116, 2, 30.0),
                              (415, 4, 116, 3, 60.0);
"#;

pub const CATALOG: &str = r#"{
    "tables": [
        { "name": "T_DOCUMENT" },
        { "name": "T_DOCUMENT_EXT" },
        { "name": "T_TAG", "parent_column": "DOC_ID" },
        { "name": "T_COMPANY" },
        { "name": "T_PERSON" },
        { "name": "T_POSITION", "type_column": "TYPE_ID" }
    ],
    "types": [
        { "name": "Person", "id": 3, "main_table": "T_PERSON",
          "attributes": [
            { "name": "Name", "columns": ["NAME"], "kind": { "scalar": "text" } },
            { "name": "Age", "columns": ["AGE"], "kind": { "scalar": "integer" } }
          ] },
        { "name": "Company", "id": 2, "main_table": "T_COMPANY",
          "attributes": [
            { "name": "Name", "columns": ["NAME"], "kind": { "scalar": "text" } },
            { "name": "Contact", "columns": ["CONTACT_ID"],
              "kind": { "link": { "target": "Person" } } }
          ] },
        { "name": "Document", "id": 1, "main_table": "T_DOCUMENT",
          "attributes": [
            { "name": "Name", "columns": ["NAME"], "kind": { "scalar": "text" } },
            { "name": "Note", "table": "T_DOCUMENT_EXT", "columns": ["NOTE"],
              "kind": { "scalar": "text" } },
            { "name": "Company", "columns": ["COMPANY_ID"],
              "kind": { "link": { "target": "Company" } } },
            { "name": "Tags", "table": "T_TAG", "columns": ["TAG"],
              "kind": { "multi_line": "text" } }
          ] },
        { "name": "Position", "id": 4, "main_table": "T_POSITION",
          "attributes": [
            { "name": "Qty", "columns": ["QTY"], "kind": { "scalar": "integer" } },
            { "name": "UnitPrice", "columns": ["TOTAL", "QTY"],
              "kind": { "multi_column": "rate" } },
            { "name": "Person", "columns": ["PERSON_ID"],
              "kind": { "link": { "target": "Person" } } }
          ] }
    ]
}"#;

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn catalog() -> Catalog {
    Catalog::from_json(CATALOG).unwrap()
}

pub fn load(conn: &Connection) {
    conn.execute_batch(SCHEMA).unwrap();
}

pub fn memory_db() -> Connection {
    init_tracing();
    let conn = Connection::open_in_memory().unwrap();
    load(&conn);
    conn
}

pub struct TestContext {
    pub conn: Connection,
    pub catalog: Catalog,
    pub dialect: SqliteDialect,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            conn: memory_db(),
            catalog: catalog(),
            dialect: SqliteDialect::new(),
        }
    }

    pub fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&self.catalog, &self.dialect)
    }

    pub fn evaluate(&self, query: &InstanceQuery, oracle: &dyn AccessOracle) -> Evaluator<'_> {
        self.executor().evaluate(&self.conn, query, oracle).unwrap()
    }
}

/// Connection wrapper that records every statement it runs.
pub struct RecordingConnection<'c> {
    inner: &'c Connection,
    statements: RefCell<Vec<String>>,
}

impl<'c> RecordingConnection<'c> {
    pub fn new(inner: &'c Connection) -> Self {
        Self {
            inner,
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }
}

impl SqlConnection for RecordingConnection<'_> {
    fn fetch(&self, sql: &str) -> Result<RawResultSet> {
        self.statements.borrow_mut().push(sql.to_string());
        self.inner.fetch(sql)
    }
}
