use insta::assert_debug_snapshot;
use pathql_error::{ErrorKind, Result};
use pathql_parser::ast::{
    AstParseable, BinaryOperator, DateTimeFunction, Expr, FromNode, JoinKind, Literal, PathName,
    Quantifier, SelectItem, SelectStatement, Statement, TrimSpec, UnaryOperator,
};
use pathql_parser::parse;
use pathql_parser::parser::Parser;
use pathql_parser::tokens::Parameter;

/// Parse a string into a part of the AST.
///
/// The provided string should be able to be tokenized. The returned Result is
/// the result of the actual parse.
fn parse_ast<A: AstParseable>(s: &str) -> Result<A> {
    let mut parser = Parser::with_query_string(s).unwrap();
    A::parse(&mut parser)
}

fn parse_select(s: &str) -> SelectStatement {
    match parse(s).unwrap() {
        Statement::Select(select) => select,
        other => panic!("not a select: {other:?}"),
    }
}

#[test]
fn parse_path_name() {
    assert_debug_snapshot!(parse_ast::<PathName>("o.customer").unwrap(), @r###"
    PathName {
        segments: [
            Ident {
                value: "o",
            },
            Ident {
                value: "customer",
            },
        ],
        location: Location {
            offset: 0,
            line: 1,
            col: 1,
        },
    }
    "###);
}

#[test]
fn parse_keyword_field_after_period() {
    let path = parse_ast::<PathName>("o.order.size").unwrap();
    assert_eq!("o.order.size", path.to_string());
}

#[test]
fn parse_precedence() {
    // AND binds tighter than OR, comparison tighter than AND.
    let expr = parse_ast::<Expr>("a = 1 OR b = 2 AND c = 3").unwrap();
    match expr {
        Expr::BinaryExpr { op, right, .. } => {
            assert_eq!(BinaryOperator::Or, op);
            assert!(matches!(
                *right,
                Expr::BinaryExpr {
                    op: BinaryOperator::And,
                    ..
                }
            ));
        }
        other => panic!("unexpected: {other:?}"),
    }

    let expr = parse_ast::<Expr>("a + b * c").unwrap();
    assert_debug_snapshot!(expr, @r###"
    BinaryExpr {
        left: Path(
            PathName {
                segments: [
                    Ident {
                        value: "a",
                    },
                ],
                location: Location {
                    offset: 0,
                    line: 1,
                    col: 1,
                },
            },
        ),
        op: Plus,
        right: BinaryExpr {
            left: Path(
                PathName {
                    segments: [
                        Ident {
                            value: "b",
                        },
                    ],
                    location: Location {
                        offset: 4,
                        line: 1,
                        col: 5,
                    },
                },
            ),
            op: Multiply,
            right: Path(
                PathName {
                    segments: [
                        Ident {
                            value: "c",
                        },
                    ],
                    location: Location {
                        offset: 8,
                        line: 1,
                        col: 9,
                    },
                },
            ),
        },
    }
    "###);
}

#[test]
fn parse_not_forms() {
    let expr = parse_ast::<Expr>("o.total NOT BETWEEN 1 AND 10").unwrap();
    assert!(matches!(expr, Expr::Between { negated: true, .. }));

    let expr = parse_ast::<Expr>("NOT o.total = 1").unwrap();
    assert!(matches!(
        expr,
        Expr::UnaryExpr {
            op: UnaryOperator::Not,
            ..
        }
    ));

    let err = parse_ast::<Expr>("o.total NOT = 1").unwrap_err();
    assert_eq!("NOT must be followed by BETWEEN, LIKE, IN or MEMBER", err.message());
}

#[test]
fn parse_is_postfix() {
    let expr = parse_ast::<Expr>("o.items IS NOT EMPTY").unwrap();
    assert!(matches!(expr, Expr::IsEmpty { negated: true, .. }));

    let expr = parse_ast::<Expr>("o.customer IS NULL").unwrap();
    assert!(matches!(expr, Expr::IsNull { negated: false, .. }));

    let err = parse_ast::<Expr>("1 IS EMPTY").unwrap_err();
    assert_eq!("IS EMPTY requires a collection-valued path", err.message());
}

#[test]
fn parse_like_escape_and_in() {
    let expr = parse_ast::<Expr>("c.name LIKE 'a\\%' ESCAPE '\\'").unwrap();
    match expr {
        Expr::Like {
            pattern, escape, ..
        } => {
            assert_eq!(Expr::Literal(Literal::String("a\\%".to_string())), *pattern);
            assert_eq!(
                Some(Box::new(Expr::Literal(Literal::String("\\".to_string())))),
                escape
            );
        }
        other => panic!("unexpected: {other:?}"),
    }

    let expr = parse_ast::<Expr>("o.status NOT IN (1, 2, ?)").unwrap();
    match expr {
        Expr::InList { negated, list, .. } => {
            assert!(negated);
            assert_eq!(3, list.len());
            assert_eq!(Expr::Parameter(Parameter::Positional(Some(1))), list[2]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn parse_member_of_optional_of() {
    for query in ["?1 MEMBER OF o.products", "?1 MEMBER o.products"] {
        let expr = parse_ast::<Expr>(query).unwrap();
        match expr {
            Expr::MemberOf { collection, .. } => {
                assert_eq!("o.products", collection.to_string())
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

#[test]
fn parse_functions() {
    let expr = parse_ast::<Expr>("COUNT(DISTINCT o.customer)").unwrap();
    match expr {
        Expr::Function(func) => {
            assert_eq!("COUNT", func.name.value);
            assert!(func.distinct);
            assert_eq!(1, func.args.len());
        }
        other => panic!("unexpected: {other:?}"),
    }

    let expr = parse_ast::<Expr>("TRIM(LEADING ' ' FROM c.name)").unwrap();
    assert!(matches!(
        expr,
        Expr::Trim {
            spec: Some(TrimSpec::Leading),
            trim_char: Some(_),
            ..
        }
    ));

    let expr = parse_ast::<Expr>("TRIM(c.name)").unwrap();
    assert!(matches!(
        expr,
        Expr::Trim {
            spec: None,
            trim_char: None,
            ..
        }
    ));

    let expr = parse_ast::<Expr>("CURRENT_DATE").unwrap();
    assert_eq!(Expr::CurrentDateTime(DateTimeFunction::CurrentDate), expr);

    // Unknown names are generic calls.
    let expr = parse_ast::<Expr>("coalesce(c.name, 'x')").unwrap();
    assert!(matches!(expr, Expr::Function(_)));
}

#[test]
fn parse_subqueries() {
    let expr = parse_ast::<Expr>("EXISTS (SELECT i FROM OrderItem i WHERE i.order = o)").unwrap();
    assert!(matches!(expr, Expr::Exists(_)));

    let expr = parse_ast::<Expr>("o.total > ALL (SELECT o2.total FROM Order o2)").unwrap();
    match expr {
        Expr::BinaryExpr { right, .. } => assert!(matches!(
            *right,
            Expr::Quantified {
                quantifier: Quantifier::All,
                ..
            }
        )),
        other => panic!("unexpected: {other:?}"),
    }

    let expr = parse_ast::<Expr>("o.id IN (SELECT i.order.id FROM OrderItem i)").unwrap();
    assert!(matches!(expr, Expr::InSubquery { negated: false, .. }));
}

#[test]
fn parse_select_full() {
    let select = parse_select(
        "SELECT DISTINCT o FROM Order o LEFT OUTER JOIN o.customer c, IN(o.items) i \
         WHERE c.name = :name GROUP BY o HAVING COUNT(i) > 1 ORDER BY o.id DESC OFFSET 5 LIMIT 10",
    );

    assert!(select.distinct);
    assert_eq!(3, select.from.len());
    assert!(matches!(
        &select.from[1],
        FromNode::Join {
            kind: JoinKind::LeftOuter,
            fetch: false,
            ..
        }
    ));
    assert!(matches!(&select.from[2], FromNode::In { .. }));
    assert_eq!(1, select.group_by.len());
    assert!(select.having.is_some());
    assert!(select.order_by[0].desc);
    assert_eq!(Some(5), select.offset);
    assert_eq!(Some(10), select.limit);
}

#[test]
fn parse_from_only() {
    let select = parse_select("FROM Order o WHERE o.id = 1");
    assert!(select.items.is_empty());
    assert_eq!(1, select.from.len());
}

#[test]
fn parse_join_fetch_without_alias() {
    let select = parse_select("SELECT o FROM Order o JOIN FETCH o.items");
    assert!(matches!(
        &select.from[1],
        FromNode::Join {
            kind: JoinKind::Inner,
            fetch: true,
            alias: None,
            ..
        }
    ));
}

#[test]
fn parse_join_requires_alias() {
    let err = parse("SELECT o FROM Order o JOIN o.items").unwrap_err();
    assert_eq!("Expected an alias for the joined path", err.message());
}

#[test]
fn parse_constructor() {
    let select =
        parse_select("SELECT NEW com.acme.Summary(o.id, c.name) FROM Order o JOIN o.customer c");
    match &select.items[0] {
        SelectItem::Constructor {
            type_name, args, ..
        } => {
            assert_eq!("com.acme.Summary", type_name);
            assert_eq!(2, args.len());
        }
        other => panic!("unexpected: {other:?}"),
    }

    let err = parse("SELECT NEW Summary(o.id) FROM Order o").unwrap_err();
    assert_eq!("Constructor type 'Summary' must be fully qualified", err.message());
}

#[test]
fn parse_order_and_member_as_identifiers() {
    let select = parse_select("SELECT order FROM Order order WHERE order.id = 1 ORDER BY order.id");
    assert_eq!(1, select.order_by.len());

    let select = parse_select("SELECT m FROM Member m");
    assert!(matches!(&select.from[0], FromNode::Entity { .. }));
}

#[test]
fn parse_select_without_from() {
    let select = parse_select("SELECT CURRENT_TIMESTAMP");
    assert!(select.from.is_empty());
}

#[test]
fn bare_parameters_numbered_sequentially() {
    let select = parse_select("SELECT o FROM Order o WHERE o.id = ?3 OR o.id = ? OR o.id = ?");
    let mut params = Vec::new();
    fn collect(expr: &Expr, out: &mut Vec<Parameter>) {
        match expr {
            Expr::Parameter(p) => out.push(p.clone()),
            Expr::BinaryExpr { left, right, .. } => {
                collect(left, out);
                collect(right, out);
            }
            _ => (),
        }
    }
    collect(select.selection.as_ref().unwrap(), &mut params);
    assert_eq!(
        vec![
            Parameter::Positional(Some(3)),
            Parameter::Positional(Some(4)),
            Parameter::Positional(Some(5)),
        ],
        params
    );
}

#[test]
fn mixed_parameters_rejected() {
    let err = parse("SELECT o FROM Order o WHERE o.id = ?1 AND o.status = :status").unwrap_err();
    assert_eq!(ErrorKind::Parse, err.kind());
    assert_eq!(
        "Make sure named parameters are not mixed with positional parameters",
        err.message()
    );
    assert_eq!(":status", err.details().unwrap().lexeme);
}

#[test]
fn trailing_tokens_rejected() {
    let err = parse("SELECT o FROM Order o WHERE o.id = 1 1").unwrap_err();
    assert_eq!("Expected end of query", err.message());
    let details = err.details().unwrap();
    assert_eq!("1", details.lexeme);
    assert_eq!(38, details.col);
}

#[test]
fn parse_error_at_end() {
    let err = parse("SELECT o FROM").unwrap_err();
    let details = err.details().unwrap();
    assert_eq!("", details.lexeme);
    assert_eq!(Some("identifier".to_string()), details.expected);
    assert_eq!("SELECT o FROM", details.source_text);
}

#[test]
fn parse_row_count_rejects_expressions() {
    let err = parse("SELECT o FROM Order o LIMIT ?1").unwrap_err();
    assert_eq!("Expected a non-negative integer", err.message());
}
