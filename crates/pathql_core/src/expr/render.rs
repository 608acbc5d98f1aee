use std::fmt;

use pathql_error::{QueryError, Result};

use super::{
    BinaryOp, CollectionPredicate, Expr, FunctionExpr, FunctionName, SubqueryKind, TrimSpec,
    UnaryOp,
};
use crate::dialect::Dialect;
use crate::query::from_item::{FromArena, FromItemId};
use crate::value::ScalarValue;

/// SQL text under construction, along with the parameter bound to each
/// placeholder in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SqlBuffer {
    sql: String,
    params: Vec<super::ParamRef>,
}

impl SqlBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub fn push_param(&mut self, param: &super::ParamRef) {
        self.sql.push('?');
        self.params.push(param.clone());
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[super::ParamRef] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<super::ParamRef>) {
        (self.sql, self.params)
    }
}

impl fmt::Write for SqlBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sql.push_str(s);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub arena: &'a FromArena,
    pub dialect: &'a Dialect,
    /// Entity loads render every loaded column, not only the key.
    pub full_load: bool,
    /// Qualifier to use for one item instead of its alias. An empty
    /// qualifier renders bare column names.
    pub qualifier: Option<(FromItemId, &'a str)>,
}

impl<'a> RenderContext<'a> {
    pub fn new(arena: &'a FromArena, dialect: &'a Dialect) -> Self {
        RenderContext {
            arena,
            dialect,
            full_load: true,
            qualifier: None,
        }
    }

    pub fn with_full_load(mut self, full_load: bool) -> Self {
        self.full_load = full_load;
        self
    }

    pub fn with_qualifier(mut self, item: FromItemId, qualifier: &'a str) -> Self {
        self.qualifier = Some((item, qualifier));
        self
    }

    pub fn write_column(&self, buf: &mut SqlBuffer, item: FromItemId, column: &str) -> Result<()> {
        if item.0 >= self.arena.len() {
            return Err(QueryError::new(format!("Unknown From-Item {item}")));
        }
        let qualifier = match self.qualifier {
            Some((id, qualifier)) if id == item => qualifier,
            _ => {
                let from = self.arena.get(item);
                if from.removed {
                    return Err(QueryError::new(format!(
                        "Column '{column}' references removed From-Item '{}'",
                        from.alias
                    )));
                }
                from.alias.as_str()
            }
        };
        if !qualifier.is_empty() {
            buf.push_str(qualifier);
            buf.push_str(".");
        }
        buf.push_str(column);
        Ok(())
    }
}

pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn render_literal(buf: &mut SqlBuffer, dialect: &Dialect, value: &ScalarValue) {
    match value {
        ScalarValue::Null => buf.push_str("NULL"),
        ScalarValue::Boolean(v) => buf.push_str(dialect.boolean_literal(*v)),
        ScalarValue::Int32(v) => buf.push_str(&v.to_string()),
        ScalarValue::Int64(v) => buf.push_str(&v.to_string()),
        ScalarValue::Float64(v) => buf.push_str(&format!("{v:?}")),
        ScalarValue::Utf8(v) => buf.push_str(&quote_string(v)),
        ScalarValue::Date(v) => buf.push_str(&format!("DATE '{v}'")),
        ScalarValue::Time(v) => buf.push_str(&format!("TIME '{v}'")),
        ScalarValue::Timestamp(v) => buf.push_str(&format!("TIMESTAMP '{v}'")),
    }
}

impl Expr {
    pub fn render(&self, buf: &mut SqlBuffer, ctx: &RenderContext) -> Result<()> {
        match self {
            Self::Literal(value) => render_literal(buf, ctx.dialect, value),
            Self::Argument(arg) => buf.push_param(&arg.param),
            Self::Null => buf.push_str("NULL"),
            Self::Column(col) => ctx.write_column(buf, col.from, &col.column)?,
            Self::BooleanColumn(col) => {
                ctx.write_column(buf, col.from, &col.column)?;
                buf.push_str(" = ");
                buf.push_str(ctx.dialect.boolean_literal(true));
            }
            Self::Binary { op, left, right } => {
                if *op == BinaryOp::Concat && !ctx.dialect.supports_concat_operator {
                    buf.push_str("CONCAT(");
                    left.render(buf, ctx)?;
                    buf.push_str(", ");
                    right.render(buf, ctx)?;
                    buf.push_str(")");
                } else {
                    render_operand(buf, ctx, left)?;
                    buf.push_str(" ");
                    buf.push_str(op.as_sql());
                    buf.push_str(" ");
                    render_operand(buf, ctx, right)?;
                }
            }
            Self::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    buf.push_str("NOT (");
                    expr.render(buf, ctx)?;
                    buf.push_str(")");
                }
                UnaryOp::Minus => {
                    buf.push_str("-");
                    render_operand(buf, ctx, expr)?;
                }
                UnaryOp::Plus => {
                    buf.push_str("+");
                    render_operand(buf, ctx, expr)?;
                }
                UnaryOp::IsNull | UnaryOp::IsNotNull => {
                    render_operand(buf, ctx, expr)?;
                    buf.push_str(if *op == UnaryOp::IsNull {
                        " IS NULL"
                    } else {
                        " IS NOT NULL"
                    });
                }
            },
            Self::And(children) => {
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        buf.push_str(" AND ");
                    }
                    child.render(buf, ctx)?;
                }
            }
            Self::Or(children) => {
                buf.push_str("(");
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        buf.push_str(" OR ");
                    }
                    match child {
                        Self::And(_) => {
                            buf.push_str("(");
                            child.render(buf, ctx)?;
                            buf.push_str(")");
                        }
                        _ => child.render(buf, ctx)?,
                    }
                }
                buf.push_str(")");
            }
            Self::Between {
                expr,
                low,
                high,
                negated,
            } => {
                render_operand(buf, ctx, expr)?;
                buf.push_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                render_operand(buf, ctx, low)?;
                buf.push_str(" AND ");
                render_operand(buf, ctx, high)?;
            }
            Self::Like {
                expr,
                pattern,
                escape,
                negated,
            } => {
                render_operand(buf, ctx, expr)?;
                buf.push_str(if *negated { " NOT LIKE " } else { " LIKE " });
                pattern.render(buf, ctx)?;
                if let Some(escape) = escape {
                    buf.push_str(" ESCAPE ");
                    escape.render(buf, ctx)?;
                }
            }
            Self::In {
                expr,
                list,
                negated,
            } => {
                render_operand(buf, ctx, expr)?;
                buf.push_str(if *negated { " NOT IN (" } else { " IN (" });
                render_list(buf, ctx, list)?;
                buf.push_str(")");
            }
            Self::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                render_operand(buf, ctx, expr)?;
                buf.push_str(if *negated { " NOT IN (" } else { " IN (" });
                subquery.render(buf, &ctx.with_full_load(false))?;
                buf.push_str(")");
            }
            Self::MemberOf(pred) => render_exists(buf, ctx, pred, !pred.negated)?,
            Self::Empty(pred) => render_exists(buf, ctx, pred, pred.negated)?,
            Self::Enum(e) => {
                if e.by_name {
                    buf.push_str(&quote_string(&e.name));
                } else {
                    buf.push_str(&e.ordinal.to_string());
                }
            }
            Self::Function(func) => render_function(buf, ctx, func)?,
            Self::Path(path) => {
                let keys = path.key_exprs()?;
                render_list(buf, ctx, &keys)?;
            }
            Self::Join(join) => join.render(buf, ctx)?,
            Self::Load(load) => load.render(buf, ctx)?,
            Self::Subquery(sub) => {
                let prefix = match sub.kind {
                    SubqueryKind::Scalar => "(",
                    SubqueryKind::Exists => "EXISTS (",
                    SubqueryKind::All => "ALL (",
                    SubqueryKind::Any => "ANY (",
                    SubqueryKind::Some => "SOME (",
                };
                buf.push_str(prefix);
                sub.body.render(buf, &ctx.with_full_load(false))?;
                buf.push_str(")");
            }
        }
        Ok(())
    }
}

/// Render an operand, parenthesizing compound expressions.
fn render_operand(buf: &mut SqlBuffer, ctx: &RenderContext, expr: &Expr) -> Result<()> {
    let compound = match expr {
        Expr::Binary { op, .. } => {
            !(*op == BinaryOp::Concat && !ctx.dialect.supports_concat_operator)
        }
        Expr::And(_) | Expr::Between { .. } | Expr::Like { .. } | Expr::In { .. } => true,
        Expr::Unary { op, .. } => matches!(op, UnaryOp::IsNull | UnaryOp::IsNotNull),
        Expr::BooleanColumn(_) => true,
        _ => false,
    };
    if compound {
        buf.push_str("(");
        expr.render(buf, ctx)?;
        buf.push_str(")");
    } else {
        expr.render(buf, ctx)?;
    }
    Ok(())
}

fn render_list(buf: &mut SqlBuffer, ctx: &RenderContext, exprs: &[Expr]) -> Result<()> {
    for (idx, expr) in exprs.iter().enumerate() {
        if idx > 0 {
            buf.push_str(", ");
        }
        expr.render(buf, ctx)?;
    }
    Ok(())
}

fn render_exists(
    buf: &mut SqlBuffer,
    ctx: &RenderContext,
    pred: &CollectionPredicate,
    exists: bool,
) -> Result<()> {
    let coll = &pred.collection;
    if !pred.element.is_empty() && pred.element.len() != coll.path.element_columns.len() {
        return Err(QueryError::bind(format!(
            "Element has {} key columns, collection '{}' expects {}",
            pred.element.len(),
            coll.path.field,
            coll.path.element_columns.len()
        )));
    }

    buf.push_str(if exists { "EXISTS (SELECT 1 FROM " } else { "NOT EXISTS (SELECT 1 FROM " });
    buf.push_str(&coll.path.table.name);
    buf.push_str(" ");
    buf.push_str(&coll.alias);
    buf.push_str(" WHERE ");
    for (idx, col) in coll.path.owner_columns.iter().enumerate() {
        if idx > 0 {
            buf.push_str(" AND ");
        }
        buf.push_str(&coll.alias);
        buf.push_str(".");
        buf.push_str(&col.target);
        buf.push_str(" = ");
        ctx.write_column(buf, coll.path.parent, &col.parent)?;
    }
    for (col, elem) in coll.path.element_columns.iter().zip(&pred.element) {
        buf.push_str(" AND ");
        buf.push_str(&coll.alias);
        buf.push_str(".");
        buf.push_str(&col.name);
        buf.push_str(" = ");
        render_operand(buf, ctx, elem)?;
    }
    buf.push_str(")");
    Ok(())
}

fn render_function(buf: &mut SqlBuffer, ctx: &RenderContext, func: &FunctionExpr) -> Result<()> {
    match &func.name {
        FunctionName::CurrentDate | FunctionName::CurrentTime | FunctionName::CurrentTimestamp => {
            buf.push_str(func.name.sql_name());
            return Ok(());
        }
        FunctionName::Concat if ctx.dialect.supports_concat_operator && func.args.len() > 1 => {
            for (idx, arg) in func.args.iter().enumerate() {
                if idx > 0 {
                    buf.push_str(" || ");
                }
                render_operand(buf, ctx, arg)?;
            }
            return Ok(());
        }
        FunctionName::Locate if ctx.dialect.has_position_function && func.args.len() == 2 => {
            buf.push_str("POSITION(");
            func.args[0].render(buf, ctx)?;
            buf.push_str(" IN ");
            func.args[1].render(buf, ctx)?;
            buf.push_str(")");
            return Ok(());
        }
        FunctionName::Trim(spec) => {
            buf.push_str("TRIM(");
            let (trim_char, expr) = match func.args.as_slice() {
                [expr] => (None, expr),
                [trim_char, expr] => (Some(trim_char), expr),
                _ => {
                    return Err(QueryError::new(format!(
                        "TRIM expects 1 or 2 arguments, got {}",
                        func.args.len()
                    )));
                }
            };
            let mut has_prefix = false;
            if let Some(spec) = spec {
                buf.push_str(match spec {
                    TrimSpec::Leading => "LEADING",
                    TrimSpec::Trailing => "TRAILING",
                    TrimSpec::Both => "BOTH",
                });
                has_prefix = true;
            }
            if let Some(trim_char) = trim_char {
                if has_prefix {
                    buf.push_str(" ");
                }
                trim_char.render(buf, ctx)?;
                has_prefix = true;
            }
            if has_prefix {
                buf.push_str(" FROM ");
            }
            expr.render(buf, ctx)?;
            buf.push_str(")");
            return Ok(());
        }
        _ => (),
    }

    buf.push_str(func.name.sql_name());
    buf.push_str("(");
    if func.distinct {
        buf.push_str("DISTINCT ");
    }
    render_list(buf, ctx, &func.args)?;
    buf.push_str(")");
    Ok(())
}
