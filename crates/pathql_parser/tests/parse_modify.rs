use pathql_parser::ast::{Expr, Statement};
use pathql_parser::parse;

#[test]
fn parse_update() {
    let stmt =
        parse("UPDATE Order o SET o.status = ?1, o.total = o.total + 1 WHERE o.id = ?2").unwrap();
    match stmt {
        Statement::Update(update) => {
            assert_eq!("Order", update.entity.value);
            assert_eq!("o", update.alias.unwrap().value);
            assert_eq!(2, update.assignments.len());
            assert_eq!("o.status", update.assignments[0].target.to_string());
            assert!(matches!(update.assignments[1].value, Expr::BinaryExpr { .. }));
            assert!(update.selection.is_some());
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn parse_update_without_alias() {
    let stmt = parse("UPDATE Order SET status = 1").unwrap();
    match stmt {
        Statement::Update(update) => {
            assert!(update.alias.is_none());
            assert!(update.selection.is_none());
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn parse_delete() {
    let stmt = parse("DELETE FROM Order AS o WHERE o.customer.name = 'x'").unwrap();
    match stmt {
        Statement::Delete(delete) => {
            assert_eq!("o", delete.alias.unwrap().value);
            assert!(delete.selection.is_some());
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn parse_delete_requires_from() {
    let err = parse("DELETE Order o").unwrap_err();
    assert_eq!("Expected FROM", err.message());
}

#[test]
fn parse_unknown_statement() {
    let err = parse("INSERT INTO Order").unwrap_err();
    assert_eq!("Expected a query", err.message());
}
