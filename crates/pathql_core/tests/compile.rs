use std::sync::Arc;

use insta::assert_snapshot;
use pathql_core::QueryCompiler;
use pathql_core::binder::bind_statement;
use pathql_core::config::CompilerConfig;
use pathql_core::dialect::Dialect;
use pathql_core::expr::ParamRef;
use pathql_core::testutil::fixture_catalog;
use pathql_core::value::DataType;
use pathql_error::ErrorKind;

const ORDER_COLUMNS: &str = "o.id, o.number, o.total, o.status, o.customer_id, o.street, o.city";

fn compiler(dialect: Dialect, enable_optimizer: bool) -> QueryCompiler {
    let config = CompilerConfig {
        dialect,
        enable_optimizer,
        ..Default::default()
    };
    QueryCompiler::with_config(Arc::new(fixture_catalog()), config)
}

#[test]
fn customer_key_comparison_eliminates_join() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT o FROM Order o WHERE o.customer.id = ?1")
        .unwrap();

    assert_eq!(
        format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.customer_id = ?"),
        compiled.sql()
    );
    assert_eq!(&[ParamRef::Positional(1)], compiled.sql_arguments());
    assert_eq!(Some(DataType::Int64), compiled.parameters()[0].datatype);
    assert_eq!(1, compiled.from_count());
    assert_eq!(&["orders".to_string()], compiled.tables());
}

#[test]
fn join_elimination_is_sound() {
    let queries = [
        "SELECT o FROM Order o WHERE o.customer.id = ?1",
        "SELECT o.number FROM Order o WHERE o.customer.id = ?1 AND o.total > 5",
        "SELECT i FROM OrderItem i WHERE i.order.customer.id = :customer",
    ];

    for query in queries {
        let optimized = compiler(Dialect::generic(), true).compile(query).unwrap();
        let unoptimized = compiler(Dialect::generic(), false).compile(query).unwrap();

        assert!(
            optimized.from_count() < unoptimized.from_count(),
            "query: {query}\noptimized: {}\nunoptimized: {}",
            optimized.sql(),
            unoptimized.sql()
        );
        assert_eq!(
            optimized.sql_arguments(),
            unoptimized.sql_arguments(),
            "query: {query}"
        );
    }
}

#[test]
fn unoptimized_keeps_navigated_join() {
    let compiled = compiler(Dialect::generic(), false)
        .compile("SELECT o FROM Order o WHERE o.customer.id = ?1")
        .unwrap();

    assert_eq!(
        format!(
            "SELECT {ORDER_COLUMNS} FROM orders o, customers customer WHERE customer.id = ? \
             AND o.customer_id = customer.id"
        ),
        compiled.sql()
    );
}

#[test]
fn customer_data_use_keeps_join() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT o FROM Order o WHERE o.customer.name = :name")
        .unwrap();

    assert_eq!(2, compiled.from_count());
    assert!(compiled.sql().contains("customer.name = ?"), "{}", compiled.sql());
}

#[test]
fn size_compiles_to_having() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT o FROM Order o WHERE SIZE(o.items) > 2")
        .unwrap();

    let sql = compiled.sql();
    assert!(sql.contains("GROUP BY o.id HAVING COUNT(items.id) > 2"), "{sql}");
    assert!(!sql.contains("SIZE"), "{sql}");
}

#[test]
fn update_without_joins_is_single_table() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("UPDATE Order o SET o.status = ?1 WHERE o.id = ?2")
        .unwrap();

    assert_snapshot!(compiled.sql(), @"UPDATE orders SET status = ? WHERE id = ?");
    assert_eq!(
        &[ParamRef::Positional(1), ParamRef::Positional(2)],
        compiled.sql_arguments()
    );
    assert_eq!(Some("orders"), compiled.target_table());
}

#[test]
fn update_with_join_follows_dialect() {
    let query = "UPDATE Order o SET o.status = ?1 WHERE o.customer.name = ?2";

    // (dialect, expected prefix)
    let cases = [
        (Dialect::mysql(), "UPDATE orders o, customers customer SET o.status = ?"),
        (Dialect::postgres(), "UPDATE orders o SET status = ? WHERE EXISTS (SELECT 1 FROM "),
        (Dialect::generic(), "UPDATE orders SET status = ? WHERE EXISTS (SELECT 1 FROM "),
    ];

    for (dialect, expected) in cases {
        let name = dialect.name.clone();
        let compiled = compiler(dialect, true).compile(query).unwrap();
        assert!(
            compiled.sql().starts_with(expected),
            "dialect: {name}\nsql: {}",
            compiled.sql()
        );
        assert_eq!(2, compiled.sql_arguments().len(), "dialect: {name}");
    }
}

#[test]
fn delete_without_joins_is_single_table() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("DELETE FROM Order o WHERE o.id = ?1")
        .unwrap();

    assert_snapshot!(compiled.sql(), @"DELETE FROM orders WHERE id = ?");
}

#[test]
fn init_is_idempotent() {
    let catalog = fixture_catalog();
    let queries = [
        "SELECT o FROM Order o WHERE o.customer.id = ?1",
        "SELECT o FROM Order o WHERE SIZE(o.items) > 2",
        "UPDATE Order o SET o.status = ?1 WHERE o.customer.name = ?2",
    ];

    for query in queries {
        let statement = pathql_parser::parse(query).unwrap();
        let mut compiled =
            bind_statement(&catalog, query, &statement, &Dialect::postgres()).unwrap();

        compiled.init(true).unwrap();
        let first = compiled.sql().to_string();
        compiled.init(true).unwrap();

        assert!(compiled.is_initialized());
        assert_eq!(first, compiled.sql(), "query: {query}");
    }
}

#[test]
fn rejects_mixed_parameters() {
    let err = compiler(Dialect::generic(), true)
        .compile("SELECT o FROM Order o WHERE o.id = ?1 AND o.number = :number")
        .unwrap_err();

    assert_eq!(ErrorKind::Parse, err.kind());
    assert!(err.to_string().contains("not mixed"), "{err}");
}

#[test]
fn compile_errors_carry_source() {
    let cases = [
        ("SELECT o FROM", ErrorKind::Parse),
        ("SELECT o FROM Order o WHERE o.nope = 1", ErrorKind::Bind),
    ];

    for (query, kind) in cases {
        let err = compiler(Dialect::generic(), true).compile(query).unwrap_err();
        assert_eq!(kind, err.kind(), "query: {query}");
        let details = err.details().expect("details");
        assert_eq!(query, details.source_text, "query: {query}");
    }
}

#[test]
fn cache_max_age_is_minimum_timeout() {
    let compiler = compiler(Dialect::generic(), true);

    // (query, max age in seconds)
    let cases = [
        ("SELECT o FROM Order o", Some(60)),
        ("SELECT i FROM OrderItem i WHERE i.order.number = 'a'", Some(30)),
        ("SELECT p FROM Product p", None),
        ("SELECT c FROM Country c", Some(300)),
        ("SELECT r FROM RushOrder r", Some(10)),
        ("SELECT o FROM Order o WHERE SIZE(o.items) > 1", Some(30)),
        ("SELECT o FROM Order o WHERE o.items IS EMPTY", Some(30)),
        ("SELECT o FROM Order o WHERE ?1 MEMBER OF o.products", Some(60)),
    ];

    for (query, expected) in cases {
        let compiled = compiler.compile(query).unwrap();
        assert_eq!(
            expected,
            compiled.cache_max_age().map(|d| d.as_secs()),
            "query: {query}"
        );
    }
}

#[test]
fn reserved_words_are_renamed() {
    let compiler = compiler(Dialect::generic(), true);

    // (query, expected fragment)
    let cases = [
        (
            "SELECT i FROM OrderItem i WHERE i.order.customer.id = ?1",
            "FROM order_items i, orders order1 WHERE order1.customer_id = ?",
        ),
        (
            "SELECT i.order.number FROM OrderItem i",
            "SELECT order1.number FROM order_items i LEFT JOIN orders order1 ON ",
        ),
        (
            "SELECT order FROM Order order",
            "SELECT order1.id, order1.number, order1.total, order1.status, order1.customer_id, \
             order1.street, order1.city FROM orders order1",
        ),
    ];

    for (query, expected) in cases {
        let sql = compiler.compile(query).unwrap().sql().to_string();
        assert!(sql.contains(expected), "query: {query}\nsql: {sql}");
        assert!(!sql.contains(" order ") && !sql.contains("order."), "{sql}");
    }
}

#[test]
fn member_of_renders_correlated_exists() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT o FROM Order o WHERE ?1 MEMBER OF o.products")
        .unwrap();

    assert_eq!(
        format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE EXISTS (SELECT 1 FROM order_products \
             products WHERE products.order_id = o.id AND products.product_id = ?)"
        ),
        compiled.sql()
    );
    assert_eq!(Some(DataType::Int64), compiled.parameters()[0].datatype);
    assert!(compiled.has_subquery());
    assert_eq!(&["order_products".to_string(), "orders".to_string()], compiled.tables());
}

#[test]
fn is_empty_reads_collection_table() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT o FROM Order o WHERE o.items IS EMPTY")
        .unwrap();

    assert_eq!(
        format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE NOT EXISTS (SELECT 1 FROM order_items \
             items WHERE items.order_id = o.id)"
        ),
        compiled.sql()
    );
    assert_eq!(&["order_items".to_string(), "orders".to_string()], compiled.tables());
    assert!(compiled.reads_writable_tables());
}

#[test]
fn many_to_many_target_folds_into_link() {
    let query = "SELECT o FROM Order o JOIN o.products p WHERE p.id = ?1";
    let optimized = compiler(Dialect::generic(), true).compile(query).unwrap();
    let unoptimized = compiler(Dialect::generic(), false).compile(query).unwrap();

    assert_eq!(3, unoptimized.from_count());
    assert_eq!(2, optimized.from_count());

    let sql = optimized.sql();
    assert!(sql.contains("order_products.product_id = ?"), "{sql}");
    assert!(!sql.contains("products p"), "{sql}");
    assert_eq!(&["order_products".to_string(), "orders".to_string()], optimized.tables());
}

#[test]
fn outer_joins_follow_their_parent() {
    let compiled = compiler(Dialect::generic(), true)
        .compile(
            "SELECT o.number, n.name FROM Order o LEFT JOIN o.customer c LEFT JOIN c.country n",
        )
        .unwrap();

    assert_eq!(
        "SELECT o.number, n.name FROM orders o LEFT JOIN customers c ON o.customer_id = c.id \
         LEFT JOIN countries n ON c.country_code = n.code",
        compiled.sql()
    );
}

#[test]
fn exists_subquery_is_optimized() {
    let compiled = compiler(Dialect::generic(), true)
        .compile(
            "SELECT o FROM Order o WHERE EXISTS \
             (SELECT i.id FROM OrderItem i WHERE i.order.id = o.id AND i.quantity > 5)",
        )
        .unwrap();

    let sql = compiled.sql();
    assert!(sql.contains(" WHERE EXISTS (SELECT "), "{sql}");
    assert!(
        sql.contains("FROM order_items i WHERE i.order_id = o.id AND i.quantity > 5)"),
        "{sql}"
    );
    assert!(!sql.contains("order1"), "{sql}");
    assert!(compiled.has_subquery());
    assert_eq!(Some(30), compiled.cache_max_age().map(|d| d.as_secs()));
}

#[test]
fn enum_constant_renders_ordinal() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT o.number FROM Order o WHERE o.status = com.acme.Status.SHIPPED")
        .unwrap();

    assert_snapshot!(compiled.sql(), @"SELECT o.number FROM orders o WHERE o.status = 2");
}

#[test]
fn element_collection_joins_its_table() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT c.name FROM Customer c, IN(c.tags) t WHERE t = 'vip'")
        .unwrap();

    let sql = compiled.sql();
    assert!(sql.contains("customer_tags t"), "{sql}");
    assert!(sql.contains("t.tag = 'vip'"), "{sql}");
    assert_eq!(2, compiled.from_count());
    assert_eq!(&["customer_tags".to_string(), "customers".to_string()], compiled.tables());
}

#[test]
fn fetch_join_adds_no_table() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT o FROM Order o JOIN FETCH o.customer")
        .unwrap();

    assert_eq!(format!("SELECT {ORDER_COLUMNS} FROM orders o"), compiled.sql());
    assert_eq!(&["o.customer".to_string()], compiled.fetch_hints());
}

#[test]
fn discriminated_entity_is_guarded() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("SELECT r FROM RushOrder r WHERE r.express")
        .unwrap();

    assert_snapshot!(
        compiled.sql(),
        @"SELECT r.id, r.number, r.express, r.customer_id FROM orders r WHERE r.express = TRUE AND r.kind = 'RUSH'"
    );
}

#[test]
fn delete_with_join_correlates_by_table_name() {
    let compiled = compiler(Dialect::generic(), true)
        .compile("DELETE FROM Order o WHERE o.customer.name = ?1")
        .unwrap();

    let sql = compiled.sql();
    assert!(
        sql.starts_with(
            "DELETE FROM orders WHERE EXISTS (SELECT 1 FROM orders o, customers customer \
             WHERE o.id = orders.id AND "
        ),
        "{sql}"
    );
    assert_eq!(Some("orders"), compiled.target_table());
}
