use pathql_error::Result;

use super::QueryBody;
use super::from_item::{FromItemId, render_conditions, render_from_clause};
use crate::expr::{Expr, RenderContext, SqlBuffer};

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Column of the target table.
    pub column: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBody {
    pub target: FromItemId,
    /// The target followed by items joined through the WHERE clause.
    pub from_list: Vec<FromItemId>,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expr>,
}

impl UpdateBody {
    pub fn extra_items(&self) -> Vec<FromItemId> {
        self.from_list
            .iter()
            .copied()
            .filter(|id| *id != self.target)
            .collect()
    }

    pub fn render(&self, buf: &mut SqlBuffer, ctx: &RenderContext) -> Result<()> {
        let target = ctx.arena.get(self.target);
        let extras = self.extra_items();
        let has_subquery = self.where_clause.as_ref().is_some_and(|e| e.has_subquery());
        let all_inner = extras.iter().all(|id| !ctx.arena.get(*id).is_outer());

        if extras.is_empty() && !has_subquery {
            // UPDATE orders SET status = ? WHERE id = ?
            let bare = ctx.with_qualifier(self.target, "");
            buf.push_str("UPDATE ");
            buf.push_str(&target.table.name);
            self.render_set(buf, &bare, false)?;
            render_conditions(
                buf,
                &bare,
                &[self.target],
                self.where_clause.as_ref(),
                " WHERE ",
            )?;
            return Ok(());
        }

        if !extras.is_empty() && ctx.dialect.supports_update_table_list {
            // UPDATE orders o, customers c SET o.status = ? WHERE ...
            buf.push_str("UPDATE ");
            render_from_clause(buf, ctx, &self.from_list)?;
            self.render_set(buf, ctx, true)?;
            render_conditions(
                buf,
                ctx,
                &self.from_list,
                self.where_clause.as_ref(),
                " WHERE ",
            )?;
            return Ok(());
        }

        if ctx.dialect.supports_update_table_alias && all_inner {
            // UPDATE orders o SET status = ? WHERE EXISTS (SELECT 1 FROM ...)
            buf.push_str("UPDATE ");
            buf.push_str(&target.table.name);
            buf.push_str(" ");
            buf.push_str(&target.alias);
            self.render_set(buf, ctx, false)?;
            render_exists_filter(buf, ctx, self.target, &extras, self.where_clause.as_ref())?;
            return Ok(());
        }

        // UPDATE orders SET status = ? WHERE EXISTS (SELECT 1 FROM orders o ...
        // WHERE o.id = orders.id AND ...)
        let by_table = ctx.with_qualifier(self.target, &target.table.name);
        buf.push_str("UPDATE ");
        buf.push_str(&target.table.name);
        self.render_set(buf, &by_table, false)?;
        render_correlated_exists(buf, ctx, self.target, &self.from_list, self.where_clause.as_ref())
    }

    fn render_set(&self, buf: &mut SqlBuffer, ctx: &RenderContext, qualified: bool) -> Result<()> {
        buf.push_str(" SET ");
        for (idx, assignment) in self.assignments.iter().enumerate() {
            if idx > 0 {
                buf.push_str(", ");
            }
            if qualified {
                ctx.write_column(buf, self.target, &assignment.column)?;
            } else {
                buf.push_str(&assignment.column);
            }
            buf.push_str(" = ");
            assignment.value.render(buf, ctx)?;
        }
        Ok(())
    }
}

/// Filter the aliased target by the predicate, moving extra items into an
/// `EXISTS` subquery. The target's own discriminator stays outside.
pub(crate) fn render_exists_filter(
    buf: &mut SqlBuffer,
    ctx: &RenderContext,
    target: FromItemId,
    extras: &[FromItemId],
    predicate: Option<&Expr>,
) -> Result<()> {
    if extras.is_empty() {
        render_conditions(buf, ctx, &[target], predicate, " WHERE ")?;
        return Ok(());
    }

    let wrote = render_conditions(buf, ctx, &[target], None, " WHERE ")?;
    buf.push_str(if wrote {
        " AND EXISTS (SELECT 1 FROM "
    } else {
        " WHERE EXISTS (SELECT 1 FROM "
    });
    render_from_clause(buf, ctx, extras)?;
    render_conditions(buf, ctx, extras, predicate, " WHERE ")?;
    buf.push_str(")");
    Ok(())
}

/// Correlate a copy of the target with the unaliased statement table by
/// identifier.
pub(crate) fn render_correlated_exists(
    buf: &mut SqlBuffer,
    ctx: &RenderContext,
    target: FromItemId,
    from_list: &[FromItemId],
    predicate: Option<&Expr>,
) -> Result<()> {
    let item = ctx.arena.get(target);
    let by_table = ctx.with_qualifier(target, &item.table.name);

    buf.push_str(" WHERE EXISTS (SELECT 1 FROM ");
    render_from_clause(buf, ctx, from_list)?;
    for (idx, id_col) in item.id_columns().iter().enumerate() {
        buf.push_str(if idx == 0 { " WHERE " } else { " AND " });
        ctx.write_column(buf, target, id_col)?;
        buf.push_str(" = ");
        by_table.write_column(buf, target, id_col)?;
    }
    let prefix = if item.id_columns().is_empty() { " WHERE " } else { " AND " };
    render_conditions(buf, ctx, from_list, predicate, prefix)?;
    buf.push_str(")");
    Ok(())
}

impl QueryBody for UpdateBody {
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
        let mut exprs: Vec<&Expr> = self.assignments.iter().map(|a| &a.value).collect();
        exprs.extend(self.where_clause.iter());
        exprs
    }

    fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        let mut exprs: Vec<&mut Expr> = self.assignments.iter_mut().map(|a| &mut a.value).collect();
        exprs.extend(self.where_clause.iter_mut());
        exprs
    }
}
