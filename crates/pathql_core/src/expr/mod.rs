//! Bound expressions.
//!
//! Expressions reference From-Items by id into the arena owned by the
//! compiled query. Predicates, joins and loads are separate node types that
//! all live in the same tree.

pub mod join;
pub mod load;
pub mod path;
pub mod render;
pub mod replace;
pub mod uses;

use std::fmt;

pub use join::{JoinColumn, JoinExpr, JoinKind};
pub use load::LoadExpr;
pub use path::{CollectionKind, CollectionPath, CollectionRef, EmbeddedPath, PathExpr, ToOnePath};
pub use pathql_parser::ast::TrimSpec;
pub use render::{RenderContext, SqlBuffer};
pub use uses::UsesMode;

use crate::query::QueryBody;
use crate::query::from_item::FromItemId;
use crate::query::select::SelectBody;
use crate::value::{DataType, ScalarValue};

/// A query parameter, either `?n` or `:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamRef {
    Positional(u32),
    Named(String),
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional(idx) => write!(f, "?{idx}"),
            Self::Named(name) => write!(f, ":{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgExpr {
    pub param: ParamRef,
}

/// A column of a From-Item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpr {
    pub from: FromItemId,
    pub column: String,
    pub datatype: DataType,
    /// Column is one of the item table's identifier columns.
    pub key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionName {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Collection size, counted over the materialized collection.
    Size,
    Abs,
    Sqrt,
    Mod,
    Length,
    Locate,
    Concat,
    Lower,
    Upper,
    Substring,
    Trim(Option<TrimSpec>),
    CurrentDate,
    CurrentTime,
    CurrentTimestamp,
    /// Passed through to SQL as written.
    Other(String),
}

impl FunctionName {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Self::Count,
            "SUM" => Self::Sum,
            "AVG" => Self::Avg,
            "MIN" => Self::Min,
            "MAX" => Self::Max,
            "SIZE" => Self::Size,
            "ABS" => Self::Abs,
            "SQRT" => Self::Sqrt,
            "MOD" => Self::Mod,
            "LENGTH" => Self::Length,
            "LOCATE" => Self::Locate,
            "CONCAT" => Self::Concat,
            "LOWER" => Self::Lower,
            "UPPER" => Self::Upper,
            "SUBSTRING" => Self::Substring,
            _ => Self::Other(name.to_string()),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Self::Count | Self::Sum | Self::Avg | Self::Min | Self::Max | Self::Size
        )
    }

    pub fn sql_name(&self) -> &str {
        match self {
            Self::Count | Self::Size => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Abs => "ABS",
            Self::Sqrt => "SQRT",
            Self::Mod => "MOD",
            Self::Length => "LENGTH",
            Self::Locate => "LOCATE",
            Self::Concat => "CONCAT",
            Self::Lower => "LOWER",
            Self::Upper => "UPPER",
            Self::Substring => "SUBSTRING",
            Self::Trim(_) => "TRIM",
            Self::CurrentDate => "CURRENT_DATE",
            Self::CurrentTime => "CURRENT_TIME",
            Self::CurrentTimestamp => "CURRENT_TIMESTAMP",
            Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpr {
    pub name: FunctionName,
    /// For TRIM, the trim character (if any) precedes the trimmed string.
    pub args: Vec<Expr>,
    pub distinct: bool,
}

/// An enum constant. Rendered as its ordinal, or its name when compared
/// against a column storing names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumExpr {
    pub type_name: String,
    pub name: String,
    pub ordinal: usize,
    pub by_name: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryKind {
    Scalar,
    Exists,
    All,
    Any,
    Some,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpr {
    pub kind: SubqueryKind,
    pub body: Box<SelectBody>,
}

/// MEMBER OF and IS EMPTY, rendered as correlated EXISTS.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPredicate {
    pub collection: CollectionRef,
    /// Key expressions of the element tested for membership. Empty for IS
    /// EMPTY.
    pub element: Vec<Expr>,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ScalarValue),
    Argument(ArgExpr),
    Null,
    Column(ColumnExpr),
    /// Boolean column used as a predicate, rendered as `col = <true>`.
    BooleanColumn(ColumnExpr),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
        negated: bool,
    },
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<SelectBody>,
        negated: bool,
    },
    MemberOf(CollectionPredicate),
    Empty(CollectionPredicate),
    Enum(EnumExpr),
    Function(FunctionExpr),
    Path(PathExpr),
    Join(JoinExpr),
    Load(LoadExpr),
    Subquery(SubqueryExpr),
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Expr {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    /// Combine conjuncts, flattening nested ANDs. Returns None when there is
    /// nothing to combine.
    pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        let mut flat = Vec::new();
        for expr in exprs {
            match expr {
                Expr::And(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::And(flat)),
        }
    }

    pub fn or_all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        let mut flat = Vec::new();
        for expr in exprs {
            match expr {
                Expr::Or(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::Or(flat)),
        }
    }

    /// Split a top-level AND into its conjuncts.
    pub fn into_conjuncts(self) -> Vec<Expr> {
        match self {
            Expr::And(children) => children,
            other => vec![other],
        }
    }

    /// Static type of the expression, if known.
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Literal(v) => v.datatype(),
            Self::Column(col) => Some(col.datatype.clone()),
            Self::BooleanColumn(_) => Some(DataType::Boolean),
            Self::Enum(e) => Some(DataType::Enum(crate::value::EnumMapping {
                type_name: e.type_name.clone(),
                by_name: e.by_name,
            })),
            Self::Binary { op, left, .. } => {
                if op.is_comparison() {
                    Some(DataType::Boolean)
                } else if *op == BinaryOp::Concat {
                    Some(DataType::Utf8)
                } else {
                    left.datatype()
                }
            }
            Self::Unary { op, expr } => match op {
                UnaryOp::Minus | UnaryOp::Plus => expr.datatype(),
                _ => Some(DataType::Boolean),
            },
            Self::And(_)
            | Self::Or(_)
            | Self::Between { .. }
            | Self::Like { .. }
            | Self::In { .. }
            | Self::InSubquery { .. }
            | Self::MemberOf(_)
            | Self::Empty(_)
            | Self::Join(_) => Some(DataType::Boolean),
            Self::Function(func) => match &func.name {
                FunctionName::Count | FunctionName::Size => Some(DataType::Int64),
                FunctionName::Avg | FunctionName::Sqrt => Some(DataType::Float64),
                FunctionName::Length | FunctionName::Locate => Some(DataType::Int32),
                FunctionName::Concat
                | FunctionName::Lower
                | FunctionName::Upper
                | FunctionName::Substring
                | FunctionName::Trim(_) => Some(DataType::Utf8),
                FunctionName::CurrentDate => Some(DataType::Date),
                FunctionName::CurrentTime => Some(DataType::Time),
                FunctionName::CurrentTimestamp => Some(DataType::Timestamp),
                FunctionName::Sum
                | FunctionName::Min
                | FunctionName::Max
                | FunctionName::Abs
                | FunctionName::Mod => func.args.first().and_then(|a| a.datatype()),
                FunctionName::Other(_) => None,
            },
            Self::Subquery(sub) => match sub.kind {
                SubqueryKind::Exists => Some(DataType::Boolean),
                _ => None,
            },
            Self::Load(load) => load.datatype(),
            Self::Argument(_) | Self::Null | Self::Path(_) => None,
        }
    }

    /// Expression evaluates to a boolean and can be used as a predicate.
    pub fn is_predicate(&self) -> bool {
        matches!(self.datatype(), Some(DataType::Boolean))
            && !matches!(self, Self::Column(_) | Self::Load(_))
    }

    /// Direct child expressions. Subquery bodies are not included.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Literal(_)
            | Self::Argument(_)
            | Self::Null
            | Self::Column(_)
            | Self::BooleanColumn(_)
            | Self::Enum(_)
            | Self::Path(_)
            | Self::Join(_)
            | Self::Subquery(_) => Vec::new(),
            Self::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Unary { expr, .. } => vec![expr.as_ref()],
            Self::And(children) | Self::Or(children) => children.iter().collect(),
            Self::Between {
                expr, low, high, ..
            } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
            Self::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut out: Vec<&Expr> = vec![expr.as_ref(), pattern.as_ref()];
                if let Some(escape) = escape {
                    out.push(escape.as_ref());
                }
                out
            }
            Self::In { expr, list, .. } => {
                let mut out: Vec<&Expr> = vec![expr.as_ref()];
                out.extend(list.iter());
                out
            }
            Self::InSubquery { expr, .. } => vec![expr.as_ref()],
            Self::MemberOf(pred) | Self::Empty(pred) => pred.element.iter().collect(),
            Self::Function(func) => func.args.iter().collect(),
            Self::Load(load) => load.children(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Self::Literal(_)
            | Self::Argument(_)
            | Self::Null
            | Self::Column(_)
            | Self::BooleanColumn(_)
            | Self::Enum(_)
            | Self::Path(_)
            | Self::Join(_)
            | Self::Subquery(_) => Vec::new(),
            Self::Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Self::Unary { expr, .. } => vec![expr.as_mut()],
            Self::And(children) | Self::Or(children) => children.iter_mut().collect(),
            Self::Between {
                expr, low, high, ..
            } => vec![expr.as_mut(), low.as_mut(), high.as_mut()],
            Self::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                let mut out: Vec<&mut Expr> = vec![expr.as_mut(), pattern.as_mut()];
                if let Some(escape) = escape {
                    out.push(escape.as_mut());
                }
                out
            }
            Self::In { expr, list, .. } => {
                let mut out: Vec<&mut Expr> = vec![expr.as_mut()];
                out.extend(list.iter_mut());
                out
            }
            Self::InSubquery { expr, .. } => vec![expr.as_mut()],
            Self::MemberOf(pred) | Self::Empty(pred) => pred.element.iter_mut().collect(),
            Self::Function(func) => func.args.iter_mut().collect(),
            Self::Load(load) => load.children_mut(),
        }
    }

    /// The nested query body of a subquery expression.
    pub fn subquery(&self) -> Option<&SelectBody> {
        match self {
            Self::Subquery(sub) => Some(&sub.body),
            Self::InSubquery { subquery, .. } => Some(subquery),
            _ => None,
        }
    }

    pub fn subquery_mut(&mut self) -> Option<&mut SelectBody> {
        match self {
            Self::Subquery(sub) => Some(&mut sub.body),
            Self::InSubquery { subquery, .. } => Some(subquery),
            _ => None,
        }
    }

    /// Check if any node in this tree matches, descending into subqueries.
    pub fn any(&self, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        if self.children().into_iter().any(|child| child.any(pred)) {
            return true;
        }
        match self.subquery() {
            Some(body) => body.exprs().into_iter().any(|expr| expr.any(pred)),
            None => false,
        }
    }

    /// Visit every node bottom-up, descending into subqueries.
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        for child in self.children_mut() {
            child.walk_mut(f);
        }
        if let Some(body) = self.subquery_mut() {
            for expr in body.exprs_mut() {
                expr.walk_mut(f);
            }
        }
        f(self)
    }

    /// Aggregate call at this level of the query. Aggregates inside
    /// subqueries belong to the subquery.
    pub fn contains_aggregate(&self) -> bool {
        if let Self::Function(func) = self {
            if func.name.is_aggregate() {
                return true;
            }
        }
        self.children().into_iter().any(|c| c.contains_aggregate())
    }

    /// Like `contains_aggregate`, but only for SIZE rewrites.
    pub fn contains_size(&self) -> bool {
        if let Self::Function(func) = self {
            if func.name == FunctionName::Size {
                return true;
            }
        }
        self.children().into_iter().any(|c| c.contains_size())
    }

    pub fn has_subquery(&self) -> bool {
        self.any(&mut |e| {
            matches!(
                e,
                Expr::Subquery(_) | Expr::InSubquery { .. } | Expr::MemberOf(_) | Expr::Empty(_)
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(item: usize, name: &str) -> Expr {
        Expr::Column(ColumnExpr {
            from: FromItemId(item),
            column: name.to_string(),
            datatype: DataType::Int64,
            key: false,
        })
    }

    #[test]
    fn and_all_flattens() {
        let inner = Expr::And(vec![col(0, "a"), col(0, "b")]);
        let out = Expr::and_all([inner, col(0, "c")]).unwrap();
        match out {
            Expr::And(children) => assert_eq!(3, children.len()),
            other => panic!("unexpected: {other:?}"),
        }

        assert_eq!(None, Expr::and_all(Vec::new()));
        assert_eq!(Some(col(0, "a")), Expr::and_all([col(0, "a")]));
    }

    #[test]
    fn aggregate_detection() {
        let count = Expr::Function(FunctionExpr {
            name: FunctionName::Size,
            args: vec![col(1, "id")],
            distinct: false,
        });
        let cmp = Expr::binary(BinaryOp::Gt, count, Expr::Literal(ScalarValue::Int64(2)));
        assert!(cmp.contains_aggregate());
        assert!(cmp.contains_size());
        assert_eq!(Some(DataType::Boolean), cmp.datatype());

        let plain = Expr::binary(BinaryOp::Eq, col(0, "a"), Expr::Null);
        assert!(!plain.contains_aggregate());
    }

    #[test]
    fn function_names() {
        assert_eq!(FunctionName::Count, FunctionName::from_name("count"));
        assert_eq!("COUNT", FunctionName::Size.sql_name());
        assert_eq!(
            FunctionName::Other("coalesce".to_string()),
            FunctionName::from_name("coalesce")
        );
    }

    #[test]
    fn param_display() {
        assert_eq!("?2", ParamRef::Positional(2).to_string());
        assert_eq!(":name", ParamRef::Named("name".to_string()).to_string());
    }
}
