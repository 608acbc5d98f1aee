use pathql_error::Result;

use super::QueryBody;
use super::from_item::{FromItemId, render_conditions, render_from_clause};
use super::update::{render_correlated_exists, render_exists_filter};
use crate::expr::{Expr, RenderContext, SqlBuffer};

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteBody {
    pub target: FromItemId,
    pub from_list: Vec<FromItemId>,
    pub where_clause: Option<Expr>,
}

impl DeleteBody {
    pub fn render(&self, buf: &mut SqlBuffer, ctx: &RenderContext) -> Result<()> {
        let target = ctx.arena.get(self.target);
        let extras: Vec<_> = self
            .from_list
            .iter()
            .copied()
            .filter(|id| *id != self.target)
            .collect();
        let has_subquery = self.where_clause.as_ref().is_some_and(|e| e.has_subquery());

        if extras.is_empty() {
            buf.push_str("DELETE FROM ");
            buf.push_str(&target.table.name);
            if has_subquery {
                // Subqueries may correlate with the alias.
                buf.push_str(" ");
                buf.push_str(&target.alias);
                render_conditions(buf, ctx, &[self.target], self.where_clause.as_ref(), " WHERE ")?;
            } else {
                let bare = ctx.with_qualifier(self.target, "");
                render_conditions(
                    buf,
                    &bare,
                    &[self.target],
                    self.where_clause.as_ref(),
                    " WHERE ",
                )?;
            }
            return Ok(());
        }

        if ctx.dialect.supports_update_table_list {
            // DELETE o FROM orders o, customers c WHERE ...
            buf.push_str("DELETE ");
            buf.push_str(&target.alias);
            buf.push_str(" FROM ");
            render_from_clause(buf, ctx, &self.from_list)?;
            render_conditions(buf, ctx, &self.from_list, self.where_clause.as_ref(), " WHERE ")?;
            return Ok(());
        }

        let all_inner = extras.iter().all(|id| !ctx.arena.get(*id).is_outer());
        if ctx.dialect.supports_update_table_alias && all_inner {
            buf.push_str("DELETE FROM ");
            buf.push_str(&target.table.name);
            buf.push_str(" ");
            buf.push_str(&target.alias);
            return render_exists_filter(
                buf,
                ctx,
                self.target,
                &extras,
                self.where_clause.as_ref(),
            );
        }

        buf.push_str("DELETE FROM ");
        buf.push_str(&target.table.name);
        render_correlated_exists(buf, ctx, self.target, &self.from_list, self.where_clause.as_ref())
    }
}

impl QueryBody for DeleteBody {
    fn from_list(&self) -> &[FromItemId] {
        &self.from_list
    }

    fn from_list_mut(&mut self) -> &mut Vec<FromItemId> {
        &mut self.from_list
    }

    fn predicates_mut(&mut self) -> Vec<&mut Option<Expr>> {
        vec![&mut self.where_clause]
    }

    fn filters(&self) -> Vec<&Expr> {
        self.where_clause.iter().collect()
    }

    fn exprs(&self) -> Vec<&Expr> {
        self.where_clause.iter().collect()
    }

    fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        self.where_clause.iter_mut().collect()
    }
}
