use super::{Expr, JoinExpr, JoinKind, LoadExpr, PathExpr};
use crate::query::from_item::{FromArena, FromItemId};

impl Expr {
    /// Rewrite references to the target of `join` after the target has been
    /// removed.
    ///
    /// An equal join re-points every reference to the parent. A many-to-one
    /// join replaces target key columns with the parent's foreign key
    /// columns; the caller guarantees nothing else references the target.
    pub fn replace_join(&mut self, join: &JoinExpr, arena: &FromArena) {
        match join.kind {
            JoinKind::Equal => {
                self.walk_mut(&mut |e: &mut Expr| e.repoint(join.target, join.parent))
            }
            JoinKind::ManyToOne => {
                self.walk_mut(&mut |e: &mut Expr| replace_key_column(e, join, arena))
            }
            JoinKind::OneToMany => (),
        }
    }

    fn repoint(&mut self, from: FromItemId, to: FromItemId) {
        let swap = |id: &mut FromItemId| {
            if *id == from {
                *id = to;
            }
        };

        match self {
            Self::Column(col) | Self::BooleanColumn(col) => swap(&mut col.from),
            Self::Path(path) => match path {
                PathExpr::Id { item, .. } => swap(item),
                PathExpr::ManyToOne(p)
                | PathExpr::KeyManyToOne(p)
                | PathExpr::DependentOneToOne(p) => {
                    swap(&mut p.parent);
                    if let Some(item) = p.item.as_mut() {
                        swap(item);
                    }
                }
                PathExpr::OneToMany(p) | PathExpr::ElementCollection(p) => swap(&mut p.parent),
                PathExpr::Embedded(p) => swap(&mut p.parent),
            },
            Self::Load(load) => match load {
                LoadExpr::Entity { item, .. } => swap(item),
                LoadExpr::Embedded { path } => swap(&mut path.parent),
                LoadExpr::Basic { .. } => (),
            },
            Self::MemberOf(pred) | Self::Empty(pred) => swap(&mut pred.collection.path.parent),
            Self::Join(j) => {
                swap(&mut j.parent);
                swap(&mut j.target);
            }
            _ => (),
        }
    }
}

fn replace_key_column(expr: &mut Expr, join: &JoinExpr, arena: &FromArena) {
    let col = match expr {
        Expr::Column(col) if col.from == join.target => col,
        _ => return,
    };
    if let Some(parent_column) = join.parent_column(&col.column) {
        col.key = arena.get(join.parent).is_id_column(parent_column);
        col.column = parent_column.to_string();
        col.from = join.parent;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{Column, Table};
    use crate::expr::{BinaryOp, ColumnExpr, JoinColumn};
    use crate::value::{DataType, ScalarValue};

    fn table(name: &str, cols: &[&str]) -> Arc<Table> {
        Arc::new(Table {
            name: name.to_string(),
            columns: cols.iter().map(|c| Column::new(*c, DataType::Int64)).collect(),
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

    #[test]
    fn many_to_one_reads_foreign_key() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders", &["id", "customer_id"]));
        let c = arena.create("customer", None, table("customers", &["id"]));
        let join = JoinExpr {
            kind: JoinKind::ManyToOne,
            parent: o,
            target: c,
            columns: vec![JoinColumn {
                parent: "customer_id".to_string(),
                target: "id".to_string(),
            }],
        };

        let mut expr = Expr::binary(
            BinaryOp::Eq,
            col(c, "id", true),
            Expr::Literal(ScalarValue::Int64(4)),
        );
        expr.replace_join(&join, &arena);

        let expected = Expr::binary(
            BinaryOp::Eq,
            col(o, "customer_id", false),
            Expr::Literal(ScalarValue::Int64(4)),
        );
        assert_eq!(expected, expr);
    }

    #[test]
    fn equal_join_repoints() {
        let mut arena = FromArena::default();
        let a = arena.create("a", None, table("orders", &["id", "total"]));
        let b = arena.create("b", None, table("orders", &["id", "total"]));
        let join = JoinExpr {
            kind: JoinKind::Equal,
            parent: a,
            target: b,
            columns: vec![JoinColumn {
                parent: "id".to_string(),
                target: "id".to_string(),
            }],
        };

        let mut expr = Expr::And(vec![col(b, "total", false), col(a, "id", true)]);
        expr.replace_join(&join, &arena);
        assert_eq!(Expr::And(vec![col(a, "total", false), col(a, "id", true)]), expr);
    }
}
