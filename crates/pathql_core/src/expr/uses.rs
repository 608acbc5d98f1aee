use super::{CollectionPredicate, Expr, LoadExpr, UnaryOp};
use crate::query::from_item::FromItemId;

/// How an expression depends on a From-Item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsesMode {
    /// Reads a value that only the item's own row can provide. Key columns
    /// reachable through a join are not data.
    Data,
    /// References the item in any way.
    Any,
    /// Evaluates to true only if the item's row exists, so the item can be
    /// inner joined.
    InnerJoin,
}

impl Expr {
    pub fn uses(&self, item: FromItemId, mode: UsesMode) -> bool {
        match mode {
            UsesMode::Data => self.any(&mut |e: &Expr| e.uses_data_here(item)),
            UsesMode::Any => self.any(&mut |e: &Expr| e.references_here(item)),
            UsesMode::InnerJoin => self.forces(item, false),
        }
    }

    /// Check if a true result proves the item's row exists. Stricter than
    /// [`UsesMode::InnerJoin`]: NOT and IS NULL never prove existence.
    pub fn exists(&self, item: FromItemId) -> bool {
        match self {
            Self::And(children) => children.iter().any(|c| c.exists(item)),
            Self::Or(children) => !children.is_empty() && children.iter().all(|c| c.exists(item)),
            Self::Unary {
                op: UnaryOp::IsNotNull,
                expr,
            } => expr.references_row(item),
            Self::Binary { op, left, right } if op.is_comparison() => {
                left.references_row(item) || right.references_row(item)
            }
            Self::Between { .. } | Self::Like { .. } | Self::In { .. } => {
                self.children().into_iter().any(|c| c.references_row(item))
            }
            Self::InSubquery { expr, .. } => expr.references_row(item),
            Self::BooleanColumn(col) => col.from == item,
            Self::Join(join) => join.parent == item || join.target == item,
            Self::MemberOf(pred) => !pred.negated && collection_refs(pred, item),
            _ => false,
        }
    }

    fn uses_data_here(&self, item: FromItemId) -> bool {
        match self {
            Self::Column(col) => col.from == item && !col.key,
            Self::BooleanColumn(col) => col.from == item,
            Self::Path(path) => path.items().contains(&item),
            Self::Load(load) => match load {
                LoadExpr::Basic { .. } => false,
                other => other.item() == Some(item),
            },
            Self::MemberOf(pred) | Self::Empty(pred) => pred.collection.path.parent == item,
            Self::Join(join) => join.parent == item || join.target == item,
            _ => false,
        }
    }

    fn references_here(&self, item: FromItemId) -> bool {
        match self {
            Self::Column(col) | Self::BooleanColumn(col) => col.from == item,
            other => other.uses_data_here(item),
        }
    }

    /// Check if this expression references the item at this query level,
    /// outside of aggregates.
    fn references_row(&self, item: FromItemId) -> bool {
        match self {
            Self::Function(func) if func.name.is_aggregate() => false,
            Self::Subquery(_) => false,
            other => {
                other.references_here(item)
                    || other.children().into_iter().any(|c| c.references_row(item))
            }
        }
    }

    /// Whether a true result requires the item's row to exist. `negated`
    /// tracks an enclosing NOT.
    fn forces(&self, item: FromItemId, negated: bool) -> bool {
        match self {
            Self::And(children) => {
                if negated {
                    children.iter().all(|c| c.forces(item, negated))
                } else {
                    children.iter().any(|c| c.forces(item, negated))
                }
            }
            Self::Or(children) => {
                if negated {
                    children.iter().any(|c| c.forces(item, negated))
                } else {
                    children.iter().all(|c| c.forces(item, negated))
                }
            }
            Self::Unary { op, expr } => match op {
                UnaryOp::Not => expr.forces(item, !negated),
                UnaryOp::IsNull => negated && expr.references_row(item),
                UnaryOp::IsNotNull => !negated && expr.references_row(item),
                UnaryOp::Minus | UnaryOp::Plus => false,
            },
            Self::Binary { op, left, right } if op.is_comparison() => {
                left.references_row(item) || right.references_row(item)
            }
            Self::Between { .. } | Self::Like { .. } | Self::In { .. } => {
                self.children().into_iter().any(|c| c.references_row(item))
            }
            Self::InSubquery { expr, .. } => expr.references_row(item),
            Self::BooleanColumn(col) => col.from == item,
            Self::Join(join) => join.parent == item || join.target == item,
            Self::MemberOf(pred) => pred.negated == negated && collection_refs(pred, item),
            Self::Empty(pred) => pred.negated != negated && collection_refs(pred, item),
            _ => false,
        }
    }
}

fn collection_refs(pred: &CollectionPredicate, item: FromItemId) -> bool {
    pred.collection.path.parent == item || pred.element.iter().any(|e| e.references_row(item))
}
