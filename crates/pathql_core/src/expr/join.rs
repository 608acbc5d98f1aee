use pathql_error::Result;

use super::render::{RenderContext, SqlBuffer};
use crate::query::from_item::{FromArena, FromItemId, JoinSemantics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Two items of the same table joined on their identifiers.
    Equal,
    /// Parent holds a foreign key to the target.
    ManyToOne,
    /// Target holds a foreign key to the parent.
    OneToMany,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumn {
    /// Column of the parent item.
    pub parent: String,
    /// Column of the target item.
    pub target: String,
}

/// Join condition between two From-Items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinExpr {
    pub kind: JoinKind,
    pub parent: FromItemId,
    pub target: FromItemId,
    pub columns: Vec<JoinColumn>,
}

impl JoinExpr {
    /// The same condition seen from the other side.
    pub fn reversed(&self) -> JoinExpr {
        let kind = match self.kind {
            JoinKind::Equal => JoinKind::Equal,
            JoinKind::ManyToOne => JoinKind::OneToMany,
            JoinKind::OneToMany => JoinKind::ManyToOne,
        };
        JoinExpr {
            kind,
            parent: self.target,
            target: self.parent,
            columns: self
                .columns
                .iter()
                .map(|c| JoinColumn {
                    parent: c.target.clone(),
                    target: c.parent.clone(),
                })
                .collect(),
        }
    }

    /// Attach this join to one of its endpoints, preferring the target.
    ///
    /// Only items in `candidates` may receive the join. Returns false if
    /// neither endpoint can take it, in which case the join has to stay in
    /// the predicate.
    pub fn bind_to_from_item(&self, arena: &mut FromArena, candidates: &[FromItemId]) -> bool {
        let reversed = self.reversed();

        for (item, join) in [(self.target, self), (self.parent, &reversed)] {
            let existing = &arena.get(item).join;
            if existing.as_ref() == Some(join) {
                return true;
            }
            if existing.is_none() && candidates.contains(&item) {
                let from = arena.get_mut(item);
                from.join = Some(join.clone());
                from.join_semantics = JoinSemantics::Inner;
                return true;
            }
        }

        false
    }

    /// A many-to-one from a link table whose row was itself reached through
    /// a one-to-many, i.e. the second half of a many-to-many.
    pub fn is_many_to_many(&self, arena: &FromArena) -> bool {
        if self.kind != JoinKind::ManyToOne {
            return false;
        }
        match &arena.get(self.parent).join {
            Some(parent_join) => {
                parent_join.kind == JoinKind::OneToMany && parent_join.target == self.parent
            }
            None => false,
        }
    }

    /// Parent column joined to the given target column.
    pub fn parent_column(&self, target_column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.target == target_column)
            .map(|c| c.parent.as_str())
    }

    /// Every given target column can be read from the parent instead.
    pub fn covers_target_columns(&self, columns: &[String]) -> bool {
        columns.iter().all(|c| self.parent_column(c).is_some())
    }

    pub fn render(&self, buf: &mut SqlBuffer, ctx: &RenderContext) -> Result<()> {
        for (idx, col) in self.columns.iter().enumerate() {
            if idx > 0 {
                buf.push_str(" AND ");
            }
            ctx.write_column(buf, self.parent, &col.parent)?;
            buf.push_str(" = ");
            ctx.write_column(buf, self.target, &col.target)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for JoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Equal => "equal",
            Self::ManyToOne => "many-to-one",
            Self::OneToMany => "one-to-many",
        };
        f.write_str(s)
    }
}

/// Debug representation used in trace logs.
pub fn describe(join: &JoinExpr, arena: &FromArena) -> String {
    format!(
        "{} {} -> {}",
        join.kind,
        arena.get(join.parent).alias,
        arena.get(join.target).alias
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::Table;

    fn table(name: &str) -> Arc<Table> {
        Arc::new(Table {
            name: name.to_string(),
            columns: Vec::new(),
            id_columns: Vec::new(),
            outgoing_links: Vec::new(),
        })
    }

    fn many_to_one(parent: FromItemId, target: FromItemId) -> JoinExpr {
        JoinExpr {
            kind: JoinKind::ManyToOne,
            parent,
            target,
            columns: vec![JoinColumn {
                parent: "customer_id".to_string(),
                target: "id".to_string(),
            }],
        }
    }

    #[test]
    fn bind_prefers_target() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let c = arena.create("c", None, table("customers"));

        let join = many_to_one(o, c);
        assert!(join.bind_to_from_item(&mut arena, &[o, c]));
        assert_eq!(Some(&join), arena.get(c).join.as_ref());
        assert_eq!(JoinSemantics::Inner, arena.get(c).join_semantics);
        assert!(arena.get(o).join.is_none());

        // Binding the same join again is a no-op.
        assert!(join.bind_to_from_item(&mut arena, &[o, c]));
    }

    #[test]
    fn bind_falls_back_to_parent() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let c = arena.create("c", None, table("customers"));
        let x = arena.create("x", None, table("customers"));
        arena.get_mut(c).join = Some(many_to_one(x, c));

        let join = many_to_one(o, c);
        assert!(join.bind_to_from_item(&mut arena, &[o, c, x]));
        let bound = arena.get(o).join.as_ref().unwrap();
        assert_eq!(JoinKind::OneToMany, bound.kind);
        assert_eq!(c, bound.parent);
        assert_eq!(o, bound.target);
    }

    #[test]
    fn bind_fails_when_both_joined() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let c = arena.create("c", None, table("customers"));
        let x = arena.create("x", None, table("customers"));
        arena.get_mut(c).join = Some(many_to_one(x, c));
        arena.get_mut(o).join = Some(many_to_one(x, o));

        assert!(!many_to_one(o, c).bind_to_from_item(&mut arena, &[o, c, x]));
    }

    #[test]
    fn bind_respects_candidates() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let c = arena.create("c", None, table("customers"));

        assert!(!many_to_one(o, c).bind_to_from_item(&mut arena, &[]));
        assert!(arena.get(c).join.is_none());
    }

    #[test]
    fn many_to_many_pattern() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let link = arena.create("products", None, table("order_products"));
        let p = arena.create("products", None, table("products"));

        arena.get_mut(link).join = Some(JoinExpr {
            kind: JoinKind::OneToMany,
            parent: o,
            target: link,
            columns: vec![JoinColumn {
                parent: "id".to_string(),
                target: "order_id".to_string(),
            }],
        });
        let to_product = JoinExpr {
            kind: JoinKind::ManyToOne,
            parent: link,
            target: p,
            columns: vec![JoinColumn {
                parent: "product_id".to_string(),
                target: "id".to_string(),
            }],
        };

        assert!(to_product.is_many_to_many(&arena));
        assert!(!many_to_one(o, p).is_many_to_many(&arena));
        assert_eq!(Some("product_id"), to_product.parent_column("id"));
    }

    #[test]
    fn reversed_swaps_sides() {
        let join = many_to_one(FromItemId(0), FromItemId(1));
        let rev = join.reversed();
        assert_eq!(JoinKind::OneToMany, rev.kind);
        assert_eq!("id", rev.columns[0].parent);
        assert_eq!(join, rev.reversed());
    }
}
