//! Statement shape, batching and failure handling over SQLite.

mod common;

use std::collections::BTreeSet;

use common::{catalog, load, memory_db, RecordingConnection, TestContext};
use instaq_core::proto::{Instance, InstanceQuery, Selection, Value};
use instaq_core::security::AllowAll;
use instaq_core::{
    EngineConfig, Error, QueryBudget, QueryExecutor, SqlConnection, SqliteDialect, TableDef,
    TypeDef,
};
use rusqlite::Connection;

fn names(
    query: &InstanceQuery,
    executor: &QueryExecutor<'_>,
    conn: &dyn SqlConnection,
) -> Vec<(i64, Value)> {
    let mut rows = executor.evaluate(conn, query, &AllowAll).unwrap();
    let mut out = Vec::new();
    while rows.next() {
        out.push((rows.inst().unwrap().id(), rows.get_index(1).unwrap()));
    }
    out
}

#[test]
fn test_one_statement_per_table_and_level() {
    let ctx = TestContext::new();
    let conn = RecordingConnection::new(&ctx.conn);
    let query = InstanceQuery::new("Document")
        .with_ids([114, 224, 334])
        .select(Selection::attribute("Name"))
        .select(Selection::attribute("Note"))
        .select(Selection::linkto("Company", vec![Selection::attribute("Name")]))
        .select(Selection::attribute("Tags"));

    let rows = ctx.executor().evaluate(&conn, &query, &AllowAll).unwrap();
    assert_eq!(rows.count(), 3);

    assert_eq!(
        conn.statements(),
        vec![
            r#"SELECT "ID", "NAME", "COMPANY_ID" FROM "T_DOCUMENT" WHERE "ID" IN (114, 224, 334)"#,
            r#"SELECT "ID", "NOTE" FROM "T_DOCUMENT_EXT" WHERE "ID" IN (114, 224, 334)"#,
            r#"SELECT "ID", "NAME" FROM "T_COMPANY" WHERE "ID" IN (115, 225, 335)"#,
            r#"SELECT "ID", "DOC_ID", "TAG" FROM "T_TAG" WHERE "DOC_ID" IN (114, 224, 334)"#,
        ]
    );
}

#[test]
fn test_batches_respect_max_expressions() {
    let ctx = TestContext::new();
    let conn = RecordingConnection::new(&ctx.conn);
    let executor = ctx
        .executor()
        .with_config(EngineConfig::new().with_max_expressions(3));
    let query = InstanceQuery::new("Document")
        .with_ids([114, 224, 334, 224])
        .select(Selection::attribute("Name"));

    let rows = names(&query, &executor, &conn);
    let statements = conn.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].matches(" UNION ").count(), 1);
    assert!(statements[0].contains("IN (114, 224)"));
    assert!(statements[0].contains("IN (334)"));

    let ids: BTreeSet<i64> = rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, BTreeSet::from([114, 224, 334]));
}

#[test]
fn test_unbounded_batching() {
    let ctx = TestContext::new();
    let conn = RecordingConnection::new(&ctx.conn);
    let dialect = SqliteDialect::new().with_max_expressions(0);
    let executor = QueryExecutor::new(&ctx.catalog, &dialect);
    let ids: Vec<i64> = (1..=2500).collect();
    let query = InstanceQuery::new("Document")
        .with_ids(ids)
        .select(Selection::attribute("Name"));

    assert_eq!(names(&query, &executor, &conn).len(), 3);
    assert!(!conn.statements()[0].contains("UNION"));
}

#[test]
fn test_default_dialect_batches_large_sets() {
    let ctx = TestContext::new();
    let conn = RecordingConnection::new(&ctx.conn);
    let ids: Vec<i64> = (1..=2500).collect();
    let query = InstanceQuery::new("Document")
        .with_ids(ids)
        .select(Selection::attribute("Name"));

    assert_eq!(names(&query, &ctx.executor(), &conn).len(), 3);
    // 2500 ids in batches of 999
    assert_eq!(conn.statements()[0].matches(" UNION ").count(), 2);
}

#[test]
fn test_default_budget_accepts_large_root_sets() {
    let ctx = TestContext::new();
    let query = InstanceQuery::new("Document")
        .with_ids(1..=100_001)
        .select(Selection::attribute("Name"));

    let rows = names(&query, &ctx.executor(), &ctx.conn);
    let ids: BTreeSet<i64> = rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, BTreeSet::from([114, 224, 334]));
}

#[test]
fn test_empty_root_set_runs_no_sql() {
    let ctx = TestContext::new();
    let conn = RecordingConnection::new(&ctx.conn);
    let query = InstanceQuery::new("Document")
        .select(Selection::attribute("Name"))
        .select(Selection::attribute("Tags"))
        .select(Selection::linkto("Company", vec![Selection::attribute("Name")]));
    let rows = ctx.executor().evaluate(&conn, &query, &AllowAll).unwrap();
    assert_eq!(rows.count(), 0);
    assert!(conn.statements().is_empty());
}

#[test]
fn test_schema_errors_before_sql() {
    let ctx = TestContext::new();
    let conn = RecordingConnection::new(&ctx.conn);
    let executor = ctx.executor();

    let unknown_attr = InstanceQuery::new("Document")
        .with_ids([114])
        .select(Selection::attribute("Name"))
        .select(Selection::linkto("Company", vec![Selection::attribute("Revenue")]));
    assert!(matches!(
        executor.evaluate(&conn, &unknown_attr, &AllowAll),
        Err(Error::UnknownAttribute { .. })
    ));

    let unknown_type = InstanceQuery::new("Invoice").with_ids([1]);
    assert!(matches!(
        executor.evaluate(&conn, &unknown_type, &AllowAll),
        Err(Error::UnknownType(_))
    ));

    // Position.Person links to Person, not Document
    let wrong_linkfrom = InstanceQuery::new("Document")
        .with_ids([114])
        .select(Selection::linkfrom("Position", "Person", vec![]));
    assert!(matches!(
        executor.evaluate(&conn, &wrong_linkfrom, &AllowAll),
        Err(Error::InvalidQuery(_))
    ));

    let wrong_root = InstanceQuery::new("Document").with_instance(Instance::new("Company", 115));
    assert!(matches!(
        executor.evaluate(&conn, &wrong_root, &AllowAll),
        Err(Error::InvalidQuery(_))
    ));

    assert!(conn.statements().is_empty());
}

#[test]
fn test_sql_error_aborts_evaluation() {
    let ctx = TestContext::new();
    ctx.catalog
        .register_table(TableDef::new("T_MISSING", "ID"))
        .unwrap();
    ctx.catalog
        .register_type(TypeDef::new("Ghost", 99, "T_MISSING"))
        .unwrap();

    let query = InstanceQuery::new("Ghost").with_ids([1]).select(Selection::instance());
    let result = ctx.executor().evaluate(&ctx.conn, &query, &AllowAll);
    assert!(matches!(result, Err(Error::Sql(_))));
}

#[test]
fn test_instance_budget() {
    let ctx = TestContext::new();
    let executor = ctx
        .executor()
        .with_config(EngineConfig::new().with_budget(QueryBudget::new(5, 2)));
    let query = InstanceQuery::new("Document")
        .with_ids([114, 224, 334])
        .select(Selection::attribute("Name"));

    assert!(matches!(
        executor.evaluate(&ctx.conn, &query, &AllowAll),
        Err(Error::BudgetExceeded(_))
    ));
}

#[test]
fn test_config_from_json() {
    let ctx = TestContext::new();
    let config =
        EngineConfig::from_json(r#"{ "max_expressions": 2, "budget": { "max_depth": 1 } }"#)
            .unwrap();
    let executor = ctx.executor().with_config(config);
    assert_eq!(executor.batcher().batch_size(), Some(1));

    let deep = InstanceQuery::new("Document").with_ids([114]).select(Selection::linkto(
        "Company",
        vec![Selection::linkto("Contact", vec![Selection::attribute("Name")])],
    ));
    assert!(matches!(
        executor.evaluate(&ctx.conn, &deep, &AllowAll),
        Err(Error::BudgetExceeded(_))
    ));
}

#[test]
fn test_file_database_in_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("instaq.db");
    {
        let conn = Connection::open(&path).unwrap();
        load(&conn);
    }

    let mut conn = Connection::open(&path).unwrap();
    let catalog = catalog();
    let dialect = SqliteDialect::new();
    let executor = QueryExecutor::new(&catalog, &dialect);
    let tx = conn.transaction().unwrap();

    let query = InstanceQuery::new("Company")
        .with_ids([115, 225])
        .select(Selection::attribute("Name"));
    assert_eq!(
        names(&query, &executor, &tx),
        vec![(115, Value::from("Acme")), (225, Value::from("Globex"))]
    );
    assert_eq!(executor.new_id(&tx, "Company").unwrap(), 336);
    tx.commit().unwrap();
}

#[test]
fn test_new_id() {
    let ctx = TestContext::new();
    let executor = ctx.executor();
    assert_eq!(executor.new_id(&ctx.conn, "Document").unwrap(), 335);
    assert_eq!(executor.new_id(&ctx.conn, "Position").unwrap(), 416);

    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE T_DOCUMENT (ID INTEGER PRIMARY KEY, NAME TEXT)")
        .unwrap();
    assert_eq!(executor.new_id(&conn, "Document").unwrap(), 1);
    assert!(matches!(
        executor.new_id(&conn, "Nope"),
        Err(Error::UnknownType(_))
    ));
}

#[test]
fn test_select_language_pipeline() {
    let ctx = TestContext::new();
    let selections = instaq_lang::parse_select(
        "attribute[Name] as name, linkto[Company].linkto[Contact].attribute[Name] as contact",
    )
    .unwrap();
    let query = InstanceQuery::new("Document")
        .with_ids([114, 224])
        .with_selections(selections);
    let mut rows = ctx.evaluate(&query, &AllowAll);

    assert!(rows.next());
    assert_eq!(rows.get_alias("contact").unwrap(), Value::from("Ada"));
    assert!(rows.next());
    assert_eq!(rows.get_alias("name").unwrap(), Value::from("Doc B"));
    assert!(!rows.next());
}

#[test]
fn test_print_statement_pipeline() {
    let ctx = TestContext::new();
    let query = instaq_lang::parse_print(
        "print Person(116) select attribute[Name], linkfrom[Position#Person].attribute[Qty] as qty",
    )
    .unwrap();
    let mut rows = ctx.evaluate(&query, &AllowAll);

    assert_eq!(rows.count(), 1);
    assert!(rows.next());
    assert_eq!(
        rows.get_alias("qty").unwrap(),
        Value::List(vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)])
    );
}

#[test]
fn test_memory_db_helper_is_isolated() {
    let a = memory_db();
    let b = memory_db();
    a.execute("DELETE FROM T_DOCUMENT", []).unwrap();
    let count: i64 = b
        .query_row("SELECT COUNT(*) FROM T_DOCUMENT", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 3);
}
