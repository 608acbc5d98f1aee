use pathql_error::Result;

use super::QueryBody;
use super::from_item::{FromItemId, render_conditions, render_from_clause};
use crate::expr::{Expr, LoadExpr, RenderContext, SqlBuffer};

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

/// A bound SELECT, either the top level statement or a subquery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectBody {
    pub distinct: bool,
    /// Select list. Every item is a load expression.
    pub items: Vec<Expr>,
    /// Type constructed from each row by `SELECT NEW`.
    pub constructor: Option<String>,
    pub from_list: Vec<FromItemId>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl SelectBody {
    pub fn loads(&self) -> impl Iterator<Item = &LoadExpr> {
        self.items.iter().filter_map(|item| match item {
            Expr::Load(load) => Some(load),
            _ => None,
        })
    }

    /// Render the statement without OFFSET/LIMIT. Entity loads render all
    /// of their columns when `ctx.full_load` is set, else only the keys.
    pub fn render(&self, buf: &mut SqlBuffer, ctx: &RenderContext) -> Result<()> {
        buf.push_str("SELECT ");
        if self.distinct {
            buf.push_str("DISTINCT ");
        }
        for (idx, item) in self.items.iter().enumerate() {
            if idx > 0 {
                buf.push_str(", ");
            }
            item.render(buf, ctx)?;
        }

        if !self.from_list.is_empty() {
            buf.push_str(" FROM ");
            render_from_clause(buf, ctx, &self.from_list)?;
        }
        render_conditions(
            buf,
            ctx,
            &self.from_list,
            self.where_clause.as_ref(),
            " WHERE ",
        )?;

        if !self.group_by.is_empty() {
            buf.push_str(" GROUP BY ");
            render_keys(buf, ctx, &self.group_by)?;
        }

        if let Some(having) = &self.having {
            buf.push_str(" HAVING ");
            having.render(buf, ctx)?;
        }

        if !self.order_by.is_empty() {
            buf.push_str(" ORDER BY ");
            for (idx, order) in self.order_by.iter().enumerate() {
                if idx > 0 {
                    buf.push_str(", ");
                }
                order.expr.render(buf, &ctx.with_full_load(false))?;
                if order.desc {
                    buf.push_str(" DESC");
                }
            }
        }

        Ok(())
    }
}

/// Grouping and ordering keys. Entity-valued keys render their identifier
/// columns.
fn render_keys(buf: &mut SqlBuffer, ctx: &RenderContext, exprs: &[Expr]) -> Result<()> {
    let ctx = ctx.with_full_load(false);
    for (idx, expr) in exprs.iter().enumerate() {
        if idx > 0 {
            buf.push_str(", ");
        }
        expr.render(buf, &ctx)?;
    }
    Ok(())
}

impl QueryBody for SelectBody {
    fn from_list(&self) -> &[FromItemId] {
        &self.from_list
    }

    fn from_list_mut(&mut self) -> &mut Vec<FromItemId> {
        &mut self.from_list
    }

    fn predicates_mut(&mut self) -> Vec<&mut Option<Expr>> {
        vec![&mut self.where_clause, &mut self.having]
    }

    fn filters(&self) -> Vec<&Expr> {
        self.where_clause.iter().chain(self.having.iter()).collect()
    }

    fn exprs(&self) -> Vec<&Expr> {
        let mut exprs: Vec<&Expr> = self.items.iter().collect();
        exprs.extend(self.where_clause.iter());
        exprs.extend(self.group_by.iter());
        exprs.extend(self.having.iter());
        exprs.extend(self.order_by.iter().map(|o| &o.expr));
        exprs
    }

    fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        let mut exprs: Vec<&mut Expr> = self.items.iter_mut().collect();
        exprs.extend(self.where_clause.iter_mut());
        exprs.extend(self.group_by.iter_mut());
        exprs.extend(self.having.iter_mut());
        exprs.extend(self.order_by.iter_mut().map(|o| &mut o.expr));
        exprs
    }
}
