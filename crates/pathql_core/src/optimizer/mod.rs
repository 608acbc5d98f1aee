//! Join extraction, From-Item rollup and join semantics resolution.
//!
//! Subquery bodies are optimized before the body containing them. Every
//! body goes through three steps:
//!
//! 1. Join conjuncts of WHERE and HAVING are attached to one of their
//!    items, becoming that item's join.
//! 2. Items whose join makes them redundant are removed until nothing else
//!    can be removed. References to a removed item are rewritten onto its
//!    join parent.
//! 3. Every remaining joined item is resolved to an inner or outer join.
//!
//! Steps 1 and 2 can be disabled to compare against unoptimized SQL.

use pathql_error::Result;
use tracing::trace;

use crate::expr::join::describe;
use crate::expr::{Expr, JoinExpr, JoinKind, UsesMode};
use crate::query::from_item::{FromArena, FromItemId, JoinSemantics};
use crate::query::{BoundStatement, QueryBody};

pub fn optimize(
    arena: &mut FromArena,
    statement: &mut BoundStatement,
    enable_optimizer: bool,
) -> Result<()> {
    let body = statement.body_mut();

    let mut result = Ok(());
    for expr in body.exprs_mut() {
        expr.walk_mut(&mut |e: &mut Expr| {
            if result.is_err() {
                return;
            }
            if let Some(subquery) = e.subquery_mut() {
                result = optimize_body(arena, subquery, enable_optimizer);
            }
        });
    }
    result?;

    optimize_body(arena, body, enable_optimizer)
}

fn optimize_body(
    arena: &mut FromArena,
    body: &mut dyn QueryBody,
    enable_optimizer: bool,
) -> Result<()> {
    if enable_optimizer {
        extract_joins(arena, body);
        rollup(arena, body);
    }
    resolve_semantics(arena, body);
    Ok(())
}

/// Move join conjuncts out of the predicates and onto items of this body.
fn extract_joins(arena: &mut FromArena, body: &mut dyn QueryBody) {
    let candidates = body.from_list().to_vec();

    for slot in body.predicates_mut() {
        let predicate = match slot.take() {
            Some(predicate) => predicate,
            None => continue,
        };

        let kept: Vec<Expr> = predicate
            .into_conjuncts()
            .into_iter()
            .filter(|conjunct| match conjunct {
                Expr::Join(join) => {
                    let bound = join.bind_to_from_item(arena, &candidates);
                    if bound {
                        trace!(join = %describe(join, &*arena), "extracted join from predicate");
                    }
                    !bound
                }
                _ => true,
            })
            .collect();

        *slot = Expr::and_all(kept);
    }
}

/// Remove redundant items until a fixed point is reached.
fn rollup(arena: &mut FromArena, body: &mut dyn QueryBody) {
    let n = body.from_list().len();
    let max_rounds = n * n + 1;

    for _ in 0..max_rounds {
        let removable = {
            let arena: &FromArena = arena;
            let body: &dyn QueryBody = body;
            body.from_list()
                .iter()
                .find_map(|id| removable_join(arena, body, *id))
        };

        match removable {
            Some(join) => remove_item(arena, body, join),
            None => return,
        }
    }
}

/// Returns the join of `id` if the item can be removed.
fn removable_join(
    arena: &FromArena,
    body: &dyn QueryBody,
    id: FromItemId,
) -> Option<JoinExpr> {
    let item = arena.get(id);
    let join = item.join.as_ref()?;
    if join.target != id || join.parent == id {
        return None;
    }

    match join.kind {
        JoinKind::Equal => {
            // Both sides read the same row. A discriminated target may only
            // fold into an item of the same entity.
            let parent = arena.get(join.parent);
            let same_entity = match (&item.entity, &parent.entity) {
                (Some(a), Some(b)) => a.name == b.name,
                _ => false,
            };
            if item.discriminator().is_some() && !same_entity {
                return None;
            }
            Some(join.clone())
        }
        JoinKind::ManyToOne => {
            if item.discriminator().is_some()
                || arena.is_join_parent(id)
                || !join.covers_target_columns(item.id_columns())
                || body.uses(id, UsesMode::Data)
            {
                return None;
            }
            if item.join_semantics == JoinSemantics::Inner && !join.is_many_to_many(arena) {
                return None;
            }
            Some(join.clone())
        }
        // The target holds the foreign key, so it cannot be read from the
        // parent.
        JoinKind::OneToMany => None,
    }
}

fn remove_item(arena: &mut FromArena, body: &mut dyn QueryBody, join: JoinExpr) {
    let removed = join.target;
    trace!(join = %describe(&join, arena), "removing From-Item");

    for expr in body.exprs_mut() {
        expr.replace_join(&join, arena);
    }

    if join.kind == JoinKind::Equal {
        // Items joined to the removed item now hang off its parent.
        let dependents: Vec<FromItemId> = arena
            .live()
            .filter(|item| item.join.as_ref().is_some_and(|j| j.parent == removed))
            .map(|item| item.id)
            .collect();
        for id in dependents {
            let item = arena.get_mut(id);
            if let Some(j) = item.join.as_mut() {
                j.parent = join.parent;
                if j.parent == j.target {
                    item.join = None;
                }
            }
        }
    }

    arena.get_mut(removed).removed = true;
    body.from_list_mut().retain(|id| *id != removed);
}

/// Decide inner or outer joins for every joined item of the body.
fn resolve_semantics(arena: &mut FromArena, body: &dyn QueryBody) {
    let from_list = body.from_list().to_vec();

    for &id in &from_list {
        let item = arena.get(id);
        let join = match &item.join {
            Some(join) => join,
            None => continue,
        };
        if item.join_semantics != JoinSemantics::Unknown {
            continue;
        }

        let semantics = if !from_list.contains(&join.parent) {
            // Correlated with an outer query.
            JoinSemantics::Inner
        } else if body.exists(id) {
            JoinSemantics::Inner
        } else if body.uses(id, UsesMode::InnerJoin) {
            trace!(alias = %item.alias, "filter rejects rows without the item");
            JoinSemantics::Inner
        } else {
            JoinSemantics::Outer
        };

        trace!(alias = %item.alias, ?semantics, "resolved join semantics");
        arena.get_mut(id).join_semantics = semantics;
    }

    // An inner joined item requires its parent row as well.
    let mut changed = true;
    while changed {
        changed = false;
        for &id in &from_list {
            let item = arena.get(id);
            if item.join_semantics != JoinSemantics::Inner {
                continue;
            }
            let parent = match &item.join {
                Some(join) if from_list.contains(&join.parent) => join.parent,
                _ => continue,
            };
            let parent_item = arena.get_mut(parent);
            if parent_item.join.is_some() && parent_item.join_semantics == JoinSemantics::Outer {
                trace!(alias = %parent_item.alias, "promoting parent to inner join");
                parent_item.join_semantics = JoinSemantics::Inner;
                changed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{Column, Table};
    use crate::expr::{BinaryOp, ColumnExpr, JoinColumn, LoadExpr, UnaryOp};
    use crate::query::select::SelectBody;
    use crate::value::{DataType, ScalarValue};

    fn table(name: &str) -> Arc<Table> {
        Arc::new(Table {
            name: name.to_string(),
            columns: vec![
                Column::new("id", DataType::Int64),
                Column::new("name", DataType::Utf8),
                Column::new("customer_id", DataType::Int64),
            ],
            id_columns: vec!["id".to_string()],
            outgoing_links: Vec::new(),
        })
    }

    fn col(item: FromItemId, name: &str, key: bool) -> Expr {
        Expr::Column(ColumnExpr {
            from: item,
            column: name.to_string(),
            datatype: DataType::Int64,
            key,
        })
    }

    fn int(v: i64) -> Expr {
        Expr::Literal(ScalarValue::Int64(v))
    }

    /// orders o with an unresolved many-to-one join to customers.
    fn setup() -> (FromArena, FromItemId, FromItemId) {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let c = arena.create("customer", None, table("customers"));
        arena.get_mut(c).join = Some(JoinExpr {
            kind: JoinKind::ManyToOne,
            parent: o,
            target: c,
            columns: vec![JoinColumn {
                parent: "customer_id".to_string(),
                target: "id".to_string(),
            }],
        });
        (arena, o, c)
    }

    fn select(o: FromItemId, c: FromItemId, predicate: Expr) -> BoundStatement {
        BoundStatement::Select(SelectBody {
            items: vec![Expr::Load(LoadExpr::basic(col(o, "id", true)))],
            from_list: vec![o, c],
            where_clause: Some(predicate),
            ..Default::default()
        })
    }

    #[test]
    fn removes_key_only_target() {
        let (mut arena, o, c) = setup();
        let pred = Expr::binary(BinaryOp::Eq, col(c, "id", true), int(1));
        let mut stmt = select(o, c, pred);

        optimize(&mut arena, &mut stmt, true).unwrap();

        let body = match &stmt {
            BoundStatement::Select(body) => body,
            _ => unreachable!(),
        };
        assert_eq!(vec![o], body.from_list);
        assert!(arena.get(c).removed);
        assert_eq!(
            Some(Expr::binary(
                BinaryOp::Eq,
                col(o, "customer_id", false),
                int(1)
            )),
            body.where_clause
        );
    }

    #[test]
    fn keeps_target_with_data_use() {
        let (mut arena, o, c) = setup();
        let pred = Expr::binary(
            BinaryOp::Eq,
            col(c, "name", false),
            Expr::Literal(ScalarValue::Utf8("x".to_string())),
        );
        let mut stmt = select(o, c, pred);

        optimize(&mut arena, &mut stmt, true).unwrap();

        assert!(!arena.get(c).removed);
        assert_eq!(JoinSemantics::Inner, arena.get(c).join_semantics);
    }

    #[test]
    fn disabled_optimizer_only_resolves_semantics() {
        let (mut arena, o, c) = setup();
        let pred = Expr::binary(BinaryOp::Eq, col(c, "id", true), int(1));
        let mut stmt = select(o, c, pred);

        optimize(&mut arena, &mut stmt, false).unwrap();

        assert!(!arena.get(c).removed);
        assert_eq!(JoinSemantics::Inner, arena.get(c).join_semantics);
    }

    #[test]
    fn unfiltered_join_is_outer() {
        let (mut arena, o, c) = setup();
        let mut stmt = BoundStatement::Select(SelectBody {
            items: vec![Expr::Load(LoadExpr::basic(col(c, "name", false)))],
            from_list: vec![o, c],
            ..Default::default()
        });

        optimize(&mut arena, &mut stmt, true).unwrap();
        assert_eq!(JoinSemantics::Outer, arena.get(c).join_semantics);
    }

    #[test]
    fn join_semantics_from_filter() {
        fn not(e: Expr) -> Expr {
            Expr::unary(UnaryOp::Not, e)
        }
        fn is_null(e: Expr) -> Expr {
            Expr::unary(UnaryOp::IsNull, e)
        }
        fn is_not_null(e: Expr) -> Expr {
            Expr::unary(UnaryOp::IsNotNull, e)
        }

        // (predicate over o and c, semantics of the customer join)
        let tests: Vec<(fn(FromItemId, FromItemId) -> Expr, JoinSemantics)> = vec![
            (|_, c| is_not_null(col(c, "name", false)), JoinSemantics::Inner),
            (|_, c| is_null(col(c, "name", false)), JoinSemantics::Outer),
            (|_, c| not(is_null(col(c, "name", false))), JoinSemantics::Inner),
            (
                |o, c| {
                    Expr::Or(vec![
                        Expr::binary(BinaryOp::Eq, col(c, "name", false), int(1)),
                        Expr::binary(BinaryOp::Eq, col(o, "name", false), int(1)),
                    ])
                },
                JoinSemantics::Outer,
            ),
        ];

        for (pred, expected) in tests {
            let (mut arena, o, c) = setup();
            let pred = pred(o, c);
            let mut stmt = BoundStatement::Select(SelectBody {
                items: vec![Expr::Load(LoadExpr::basic(col(o, "id", true)))],
                from_list: vec![o, c],
                where_clause: Some(pred.clone()),
                ..Default::default()
            });

            optimize(&mut arena, &mut stmt, false).unwrap();
            assert_eq!(expected, arena.get(c).join_semantics, "{pred:?}");
        }
    }

    #[test]
    fn extracted_equal_join_folds_self_join() {
        let mut arena = FromArena::default();
        let a = arena.create("a", None, table("orders"));
        let b = arena.create("b", None, table("orders"));
        let join = Expr::Join(JoinExpr {
            kind: JoinKind::Equal,
            parent: a,
            target: b,
            columns: vec![JoinColumn {
                parent: "id".to_string(),
                target: "id".to_string(),
            }],
        });
        let filter = Expr::binary(
            BinaryOp::Eq,
            col(b, "name", false),
            Expr::Literal(ScalarValue::Utf8("x".to_string())),
        );
        let mut stmt = BoundStatement::Select(SelectBody {
            items: vec![Expr::Load(LoadExpr::basic(col(a, "id", true)))],
            from_list: vec![a, b],
            where_clause: Expr::and_all([join, filter]),
            ..Default::default()
        });

        optimize(&mut arena, &mut stmt, true).unwrap();

        let body = match &stmt {
            BoundStatement::Select(body) => body,
            _ => unreachable!(),
        };
        assert_eq!(vec![a], body.from_list);
        assert_eq!(
            Some(Expr::binary(
                BinaryOp::Eq,
                col(a, "name", false),
                Expr::Literal(ScalarValue::Utf8("x".to_string()))
            )),
            body.where_clause
        );
    }
}
