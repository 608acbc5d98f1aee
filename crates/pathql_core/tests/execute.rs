use std::sync::Arc;

use pathql_core::QueryCompiler;
use pathql_core::config::{CacheConfig, CompilerConfig};
use pathql_core::execution::{ResultRow, ResultValue};
use pathql_core::testutil::{MemoryBackend, MemoryObject, MemorySession, fixture_catalog};
use pathql_core::value::ScalarValue;
use pathql_error::ErrorKind;

fn compiler_with_cache(cache: CacheConfig) -> QueryCompiler {
    let config = CompilerConfig {
        cache,
        ..Default::default()
    };
    QueryCompiler::with_config(Arc::new(fixture_catalog()), config)
}

fn compiler() -> QueryCompiler {
    QueryCompiler::new(Arc::new(fixture_catalog()))
}

/// Columns of a fully loaded `Order`.
fn order_row(id: i64) -> Vec<ScalarValue> {
    vec![
        ScalarValue::Int64(id),
        ScalarValue::Utf8(format!("N-{id}")),
        ScalarValue::Float64(10.5),
        ScalarValue::Int32(1),
        ScalarValue::Int64(7),
        ScalarValue::from("Main St"),
        ScalarValue::from("Springfield"),
    ]
}

fn order_ids(rows: &[ResultRow<MemoryObject>]) -> Vec<i64> {
    rows.iter()
        .map(|row| match row.get(0) {
            Some(ResultValue::Object(o)) => o.values[0].try_as_i64().unwrap(),
            other => panic!("unexpected value: {other:?}"),
        })
        .collect()
}

#[test]
fn cached_select_skips_backend_until_invalidated() {
    logutil::init_test();

    let compiler = compiler();
    let backend = MemoryBackend::new();
    backend.set_rows(vec![order_row(1), order_row(2)]);
    let session = MemorySession::new();

    let run = || {
        let mut query = compiler
            .create_query("SELECT o FROM Order o WHERE o.status = ?1", &backend, &session)
            .unwrap();
        query.set_parameter(1, 1).unwrap();
        query.result_list().unwrap()
    };

    assert_eq!(vec![1, 2], order_ids(&run()));
    assert_eq!(1, backend.execution_count());

    assert_eq!(vec![1, 2], order_ids(&run()));
    assert_eq!(1, backend.execution_count());

    backend.set_update_count(1);
    let mut update = compiler
        .create_query("UPDATE Order o SET o.status = ?1 WHERE o.id = ?2", &backend, &session)
        .unwrap();
    update.set_parameter(1, 2).unwrap().set_parameter(2, 1i64).unwrap();
    assert_eq!(1, update.execute_update().unwrap());
    assert_eq!(2, backend.execution_count());
    assert_eq!(1, compiler.cache().stats().invalidations);

    assert_eq!(vec![1, 2], order_ids(&run()));
    assert_eq!(3, backend.execution_count());

    let executed = backend.executed();
    assert_eq!("UPDATE orders SET status = ? WHERE id = ?", executed[1].sql);
    assert_eq!(vec![ScalarValue::Int32(2), ScalarValue::Int64(1)], executed[1].values);
}

#[test]
fn different_arguments_use_different_entries() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    backend.set_rows(vec![order_row(1)]);
    let session = MemorySession::new();

    for status in [1, 2, 1, 2] {
        let mut query = compiler
            .create_query("SELECT o FROM Order o WHERE o.status = ?1", &backend, &session)
            .unwrap();
        query.set_parameter(1, status).unwrap();
        query.result_list().unwrap();
    }

    assert_eq!(2, backend.execution_count());
    let stats = compiler.cache().stats();
    assert_eq!((2, 2, 2), (stats.hits, stats.misses, stats.entries));
}

#[test]
fn update_without_affected_rows_keeps_cache() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    backend.set_rows(vec![order_row(1)]);
    let session = MemorySession::new();

    let query = compiler.create_query("SELECT o FROM Order o", &backend, &session).unwrap();
    query.result_list().unwrap();

    backend.set_update_count(0);
    let mut delete = compiler
        .create_query("DELETE FROM Order o WHERE o.id = ?1", &backend, &session)
        .unwrap();
    delete.set_parameter(1, 5i64).unwrap();
    assert_eq!(0, delete.execute_update().unwrap());

    query.result_list().unwrap();
    assert_eq!(2, backend.execution_count());
    assert_eq!(0, compiler.cache().stats().invalidations);
}

#[test]
fn uncacheable_entity_always_executes() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    backend.set_rows(vec![vec![
        ScalarValue::Int64(1),
        ScalarValue::from("Widget"),
        ScalarValue::Float64(2.5),
    ]]);
    let session = MemorySession::new();

    for _ in 0..3 {
        let query = compiler.create_query("SELECT p FROM Product p", &backend, &session).unwrap();
        assert_eq!(1, query.result_list().unwrap().len());
    }
    assert_eq!(3, backend.execution_count());
    assert_eq!(0, compiler.cache().stats().entries);
}

#[test]
fn write_transaction_bypasses_cache_for_writable_entities() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    let session = MemorySession::new();
    session.set_write_transaction(true);

    backend.set_rows(vec![order_row(1)]);
    for _ in 0..2 {
        let query = compiler.create_query("SELECT o FROM Order o", &backend, &session).unwrap();
        query.result_list().unwrap();
    }
    assert_eq!(2, backend.execution_count());

    // Read only entities are still cached.
    backend.set_rows(vec![vec![ScalarValue::from("NL"), ScalarValue::from("Netherlands")]]);
    for _ in 0..2 {
        let query = compiler.create_query("SELECT c FROM Country c", &backend, &session).unwrap();
        query.result_list().unwrap();
    }
    assert_eq!(3, backend.execution_count());
}

#[test]
fn open_chain_continues_from_backend() {
    let compiler = compiler_with_cache(CacheConfig {
        chunk_size: 2,
        max_chunks: 1,
        ..Default::default()
    });
    let backend = MemoryBackend::new();
    backend.set_rows((1..=5).map(order_row).collect());
    let session = MemorySession::new();

    let query = compiler.create_query("SELECT o FROM Order o", &backend, &session).unwrap();
    assert_eq!(vec![1, 2, 3, 4, 5], order_ids(&query.result_list().unwrap()));
    // Fill, then the rows after the cached window.
    assert_eq!(2, backend.execution_count());

    assert_eq!(vec![1, 2, 3, 4, 5], order_ids(&query.result_list().unwrap()));
    assert_eq!(3, backend.execution_count());

    let executed = backend.executed();
    assert!(executed[0].sql.ends_with(" LIMIT 3"), "{}", executed[0].sql);
    assert!(executed[1].sql.ends_with(" OFFSET 2"), "{}", executed[1].sql);
}

#[test]
fn result_window_over_cached_rows() {
    let compiler = compiler_with_cache(CacheConfig {
        chunk_size: 2,
        max_chunks: 1,
        ..Default::default()
    });
    let backend = MemoryBackend::new();
    backend.set_rows((1..=5).map(order_row).collect());
    let session = MemorySession::new();

    let mut query = compiler.create_query("SELECT o FROM Order o", &backend, &session).unwrap();
    query.set_first_result(1).set_max_results(2);
    assert_eq!(vec![2, 3], order_ids(&query.result_list().unwrap()));

    // Past the first chunk the cache is not used.
    query.set_first_result(3).set_max_results(5);
    assert_eq!(vec![4, 5], order_ids(&query.result_list().unwrap()));
    let last = backend.executed().pop().unwrap();
    assert!(last.sql.ends_with(" LIMIT 5 OFFSET 3"), "{}", last.sql);
}

#[test]
fn parameters_are_checked_before_execution() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    let session = MemorySession::new();

    let mut query = compiler
        .create_query("SELECT o FROM Order o WHERE o.id = :id", &backend, &session)
        .unwrap();

    let err = query.result_list().unwrap_err();
    assert_eq!(ErrorKind::Bind, err.kind());
    assert!(err.to_string().contains("':id' is not bound"), "{err}");

    let err = query.set_named_parameter("nope", 1).unwrap_err();
    assert_eq!(ErrorKind::Bind, err.kind());

    let err = query.set_named_parameter("id", "abc").unwrap_err();
    assert_eq!(ErrorKind::Bind, err.kind());

    let err = query.set_parameter(1, 1).unwrap_err();
    assert_eq!(ErrorKind::Bind, err.kind());

    assert_eq!(0, backend.execution_count());
}

#[test]
fn backend_failure_caches_nothing() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    backend.set_failure(Some("connection reset"));
    let session = MemorySession::new();

    let query = compiler.create_query("SELECT o FROM Order o", &backend, &session).unwrap();
    let err = query.result_list().unwrap_err();
    assert_eq!(ErrorKind::Backend, err.kind());
    assert!(err.get_field("sql").is_some_and(|sql| sql.starts_with("SELECT o.id")));
    assert_eq!(0, compiler.cache().stats().entries);

    backend.set_failure(None);
    backend.set_rows(vec![order_row(1)]);
    assert_eq!(vec![1], order_ids(&query.result_list().unwrap()));
}

#[test]
fn single_result() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    let session = MemorySession::new();
    let query = compiler.create_query("SELECT o FROM Order o", &backend, &session).unwrap();

    backend.set_rows(vec![]);
    assert!(query.single_result().unwrap().is_none());
    compiler.cache().clear();

    backend.set_rows(vec![order_row(1), order_row(2)]);
    assert!(query.single_result().is_err());
}

#[test]
fn constructor_and_outer_joined_entity() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    let session = MemorySession::new();

    backend.set_rows(vec![vec![ScalarValue::from("N-1"), ScalarValue::Float64(3.5)]]);
    let query = compiler
        .create_query(
            "SELECT NEW com.acme.OrderSummary(o.number, o.total) FROM Order o",
            &backend,
            &session,
        )
        .unwrap();
    let rows = query.result_list().unwrap();
    assert_eq!(
        Some(&ResultValue::Object(MemoryObject {
            type_name: "com.acme.OrderSummary".to_string(),
            values: vec![ScalarValue::from("N-1"), ScalarValue::Float64(3.5)],
        })),
        rows[0].get(0)
    );

    // An order without a customer.
    backend.set_rows(vec![vec![
        ScalarValue::from("N-2"),
        ScalarValue::Null,
        ScalarValue::Null,
        ScalarValue::Null,
    ]]);
    let query = compiler
        .create_query("SELECT o.number, o.customer FROM Order o", &backend, &session)
        .unwrap();
    let rows = query.result_list().unwrap();
    assert_eq!(Some(&ResultValue::Scalar(ScalarValue::Null)), rows[0].get(1));
    assert_eq!(0, session.load_count());
}

#[test]
fn wrong_statement_kind() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    let session = MemorySession::new();

    let select = compiler.create_query("SELECT o FROM Order o", &backend, &session).unwrap();
    assert_eq!(ErrorKind::Unsupported, select.execute_update().unwrap_err().kind());

    let delete = compiler.create_query("DELETE FROM Order o", &backend, &session).unwrap();
    assert_eq!(ErrorKind::Unsupported, delete.result_list().unwrap_err().kind());
}

#[test]
fn collection_delete_invalidates_empty_check() {
    let compiler = compiler();
    let backend = MemoryBackend::new();
    backend.set_rows(vec![order_row(1)]);
    let session = MemorySession::new();

    let run = || {
        compiler
            .create_query("SELECT o FROM Order o WHERE o.items IS EMPTY", &backend, &session)
            .unwrap()
            .result_list()
            .unwrap()
    };

    assert_eq!(vec![1], order_ids(&run()));
    assert_eq!(vec![1], order_ids(&run()));
    assert_eq!(1, backend.execution_count());

    backend.set_update_count(1);
    let mut delete = compiler
        .create_query("DELETE FROM OrderItem i WHERE i.id = ?1", &backend, &session)
        .unwrap();
    delete.set_parameter(1, 3i64).unwrap();
    assert_eq!(1, delete.execute_update().unwrap());
    assert_eq!(1, compiler.cache().stats().invalidations);

    run();
    assert_eq!(3, backend.execution_count());
}
