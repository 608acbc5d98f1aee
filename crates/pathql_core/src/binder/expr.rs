use pathql_error::{OptionExt, QueryError, Result};
use pathql_parser::ast::{
    self, BinaryOperator, DateTimeFunction, Literal, Location, PathName, Quantifier,
    SelectStatement, UnaryOperator,
};

use super::Binder;
use crate::expr::{
    BinaryOp, CollectionPath, CollectionPredicate, Expr, FunctionExpr, FunctionName, JoinColumn,
    JoinExpr, JoinKind, PathExpr, SubqueryExpr, SubqueryKind, UnaryOp,
};
use crate::query::select::SelectBody;
use crate::value::{DataType, ScalarValue};

impl Binder<'_> {
    /// Bind an expression that must evaluate to a boolean.
    pub(super) fn bind_predicate(&mut self, expr: &ast::Expr) -> Result<Expr> {
        let bound = self.bind_expr(expr)?;
        match bound {
            Expr::Column(col) if col.datatype == DataType::Boolean => Ok(Expr::BooleanColumn(col)),
            Expr::Path(_) => Err(self.error_at(
                "Path cannot be used as a condition",
                location_of(expr),
                &lexeme_of(expr),
            )),
            other if other.is_predicate() => Ok(other),
            _ => Err(self.error_at(
                "Expression is not a condition",
                location_of(expr),
                &lexeme_of(expr),
            )),
        }
    }

    /// Bind an expression that must produce a single value.
    pub(super) fn bind_scalar(&mut self, expr: &ast::Expr) -> Result<Expr> {
        let bound = self.bind_expr(expr)?;
        if let Expr::Path(path) = &bound {
            let what = if path.is_collection() {
                "Collection"
            } else if path.is_entity() {
                "Entity"
            } else {
                "Embedded"
            };
            return Err(self.error_at(
                format!("{what} path cannot be used as a value here"),
                location_of(expr),
                &lexeme_of(expr),
            ));
        }
        Ok(bound)
    }

    /// Bind any expression. Paths are returned unresolved to columns so the
    /// caller can decide how an entity is used.
    pub(super) fn bind_expr(&mut self, expr: &ast::Expr) -> Result<Expr> {
        Ok(match expr {
            ast::Expr::Path(path) => self.resolve_path(path)?,
            ast::Expr::Literal(literal) => Expr::Literal(bind_literal(literal)),
            ast::Expr::Parameter(param) => self.bind_parameter(param)?,
            ast::Expr::Null => Expr::Null,
            ast::Expr::Nested(inner) => self.bind_expr(inner)?,
            ast::Expr::BinaryExpr { left, op, right } => self.bind_binary(left, *op, right)?,
            ast::Expr::UnaryExpr { op, expr } => match op {
                UnaryOperator::Not => Expr::unary(UnaryOp::Not, self.bind_predicate(expr)?),
                UnaryOperator::Minus => Expr::unary(UnaryOp::Minus, self.bind_scalar(expr)?),
                UnaryOperator::Plus => Expr::unary(UnaryOp::Plus, self.bind_scalar(expr)?),
            },
            ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => self.bind_between(expr, *negated, low, high)?,
            ast::Expr::Like {
                expr,
                negated,
                pattern,
                escape,
            } => self.bind_like(expr, *negated, pattern, escape.as_deref())?,
            ast::Expr::InList {
                expr,
                negated,
                list,
            } => {
                let bound = self.bind_scalar(expr)?;
                let datatype = bound.datatype();
                let mut items = Vec::with_capacity(list.len());
                for item in list {
                    let mut item = self.bind_scalar(item)?;
                    self.align(&mut item, datatype.clone());
                    items.push(item);
                }
                Expr::In {
                    expr: Box::new(bound),
                    list: items,
                    negated: *negated,
                }
            }
            ast::Expr::InSubquery {
                expr,
                negated,
                subquery,
            } => Expr::InSubquery {
                expr: Box::new(self.bind_scalar(expr)?),
                subquery: self.bind_subquery(subquery)?,
                negated: *negated,
            },
            ast::Expr::MemberOf {
                expr,
                negated,
                collection,
            } => self.bind_member_of(expr, *negated, collection)?,
            ast::Expr::IsNull { expr, negated } => self.bind_is_null(expr, *negated)?,
            ast::Expr::IsEmpty { path, negated } => {
                let collection = self.collection_path(path)?;
                Expr::Empty(CollectionPredicate {
                    collection: self.collection_ref(collection),
                    element: Vec::new(),
                    negated: *negated,
                })
            }
            ast::Expr::Function(func) => self.bind_function(func)?,
            ast::Expr::Trim {
                spec,
                trim_char,
                expr,
            } => {
                let mut args = Vec::with_capacity(2);
                if let Some(trim_char) = trim_char {
                    args.push(self.bind_scalar(trim_char)?);
                }
                args.push(self.bind_scalar(expr)?);
                for arg in &args {
                    self.infer_parameter(arg, Some(DataType::Utf8));
                }
                Expr::Function(FunctionExpr {
                    name: FunctionName::Trim(*spec),
                    args,
                    distinct: false,
                })
            }
            ast::Expr::CurrentDateTime(func) => Expr::Function(FunctionExpr {
                name: match func {
                    DateTimeFunction::CurrentDate => FunctionName::CurrentDate,
                    DateTimeFunction::CurrentTime => FunctionName::CurrentTime,
                    DateTimeFunction::CurrentTimestamp => FunctionName::CurrentTimestamp,
                },
                args: Vec::new(),
                distinct: false,
            }),
            ast::Expr::Subquery(subquery) => Expr::Subquery(SubqueryExpr {
                kind: SubqueryKind::Scalar,
                body: self.bind_subquery(subquery)?,
            }),
            ast::Expr::Exists(subquery) => Expr::Subquery(SubqueryExpr {
                kind: SubqueryKind::Exists,
                body: self.bind_subquery(subquery)?,
            }),
            ast::Expr::Quantified {
                quantifier,
                subquery,
            } => Expr::Subquery(SubqueryExpr {
                kind: match quantifier {
                    Quantifier::All => SubqueryKind::All,
                    Quantifier::Any => SubqueryKind::Any,
                    Quantifier::Some => SubqueryKind::Some,
                },
                body: self.bind_subquery(subquery)?,
            }),
        })
    }

    /// Bind a nested SELECT in its own scope. Names of enclosing queries stay
    /// visible.
    pub(super) fn bind_subquery(&mut self, select: &SelectStatement) -> Result<Box<SelectBody>> {
        self.push_scope();
        let result = self.bind_select(select, false);
        self.pop_scope();
        result.map(Box::new)
    }

    fn bind_binary(
        &mut self,
        left: &ast::Expr,
        op: BinaryOperator,
        right: &ast::Expr,
    ) -> Result<Expr> {
        let op = match op {
            BinaryOperator::And => {
                let left = self.bind_predicate(left)?;
                let right = self.bind_predicate(right)?;
                return Expr::and_all([left, right]).required("conjunction");
            }
            BinaryOperator::Or => {
                let left = self.bind_predicate(left)?;
                let right = self.bind_predicate(right)?;
                return Expr::or_all([left, right]).required("disjunction");
            }
            BinaryOperator::Eq => BinaryOp::Eq,
            BinaryOperator::NotEq => BinaryOp::NotEq,
            BinaryOperator::Lt => BinaryOp::Lt,
            BinaryOperator::LtEq => BinaryOp::LtEq,
            BinaryOperator::Gt => BinaryOp::Gt,
            BinaryOperator::GtEq => BinaryOp::GtEq,
            BinaryOperator::Plus => BinaryOp::Plus,
            BinaryOperator::Minus => BinaryOp::Minus,
            BinaryOperator::Multiply => BinaryOp::Multiply,
            BinaryOperator::Divide => BinaryOp::Divide,
            BinaryOperator::Modulo => BinaryOp::Modulo,
            BinaryOperator::Concat => BinaryOp::Concat,
        };

        let mut l = self.bind_expr(left)?;
        let mut r = self.bind_expr(right)?;

        if matches!(l, Expr::Path(_)) || matches!(r, Expr::Path(_)) {
            if !op.is_comparison() {
                let ast = if matches!(l, Expr::Path(_)) { left } else { right };
                return Err(self.error_at(
                    format!("Operator '{}' cannot be applied to a path", op.as_sql()),
                    location_of(ast),
                    &lexeme_of(ast),
                ));
            }
            return self.bind_entity_comparison(op, l, r, left);
        }

        self.align(&mut l, r.datatype());
        self.align(&mut r, l.datatype());
        if op == BinaryOp::Concat {
            self.infer_parameter(&l, Some(DataType::Utf8));
            self.infer_parameter(&r, Some(DataType::Utf8));
        }
        Ok(Expr::binary(op, l, r))
    }

    /// Compare entities by their keys. Equality between two items of the
    /// same table, or between a many-to-one path and an item of its target,
    /// becomes a join.
    fn bind_entity_comparison(
        &mut self,
        op: BinaryOp,
        left: Expr,
        right: Expr,
        ast: &ast::Expr,
    ) -> Result<Expr> {
        if op == BinaryOp::Eq {
            if let Some(join) = comparison_join(&left, &right) {
                return Ok(Expr::Join(join));
            }
        }

        let lkeys = self.comparison_keys(left, ast)?;
        let rkeys = self.comparison_keys(right, ast)?;

        let (lkeys, rkeys) = match (lkeys, rkeys) {
            (Keys::Entity(l), Keys::Entity(r)) => {
                if l.len() != r.len() {
                    return Err(self.error_at(
                        "Compared entities have different key columns",
                        location_of(ast),
                        &lexeme_of(ast),
                    ));
                }
                (l, r)
            }
            (Keys::Entity(keys), Keys::Value(value)) | (Keys::Value(value), Keys::Entity(keys)) => {
                if keys.len() != 1 {
                    return Err(QueryError::unsupported(
                        "Comparing an entity with a composite key to a single value",
                    ));
                }
                self.infer_parameter(&value, keys[0].datatype());
                (keys, vec![value])
            }
            (Keys::Value(_), Keys::Value(_)) => {
                return Err(QueryError::new("Entity comparison without an entity"));
            }
        };

        let pairs = lkeys
            .into_iter()
            .zip(rkeys)
            .map(|(l, r)| Expr::binary(op, l, r));
        match op {
            BinaryOp::Eq => Expr::and_all(pairs).required("key comparison"),
            BinaryOp::NotEq => Expr::or_all(pairs).required("key comparison"),
            other => Err(self.error_at(
                format!("Entities can only be compared for equality, not '{}'", other.as_sql()),
                location_of(ast),
                &lexeme_of(ast),
            )),
        }
    }

    fn comparison_keys(&mut self, expr: Expr, ast: &ast::Expr) -> Result<Keys> {
        match expr {
            Expr::Path(path) if path.is_entity() => Ok(Keys::Entity(self.entity_keys(path)?)),
            Expr::Path(_) => Err(self.error_at(
                "Only entities and values can be compared",
                location_of(ast),
                &lexeme_of(ast),
            )),
            Expr::Argument(_) => Ok(Keys::Value(expr)),
            _ => Err(self.error_at(
                "Entity compared with a value that is not a parameter",
                location_of(ast),
                &lexeme_of(ast),
            )),
        }
    }

    fn bind_between(
        &mut self,
        expr: &ast::Expr,
        negated: bool,
        low: &ast::Expr,
        high: &ast::Expr,
    ) -> Result<Expr> {
        let mut bound = self.bind_scalar(expr)?;
        let mut low_bound = self.bind_scalar(low)?;
        let mut high_bound = self.bind_scalar(high)?;

        let datatype = bound.datatype();
        for (bound_expr, ast) in [(&low_bound, low), (&high_bound, high)] {
            if let (Expr::Literal(value), Some(datatype)) = (bound_expr, &datatype) {
                if let Some(literal_type) = value.datatype() {
                    if !datatype.is_comparable_with(&literal_type) {
                        return Err(self.error_at(
                            format!("BETWEEN bound of type {literal_type} for a {datatype} value"),
                            location_of(ast),
                            &lexeme_of(ast),
                        ));
                    }
                }
            }
        }

        self.align(&mut low_bound, datatype.clone());
        self.align(&mut high_bound, datatype);
        self.align(&mut bound, low_bound.datatype().or(high_bound.datatype()));

        Ok(Expr::Between {
            expr: Box::new(bound),
            low: Box::new(low_bound),
            high: Box::new(high_bound),
            negated,
        })
    }

    fn bind_like(
        &mut self,
        expr: &ast::Expr,
        negated: bool,
        pattern: &ast::Expr,
        escape: Option<&ast::Expr>,
    ) -> Result<Expr> {
        let bound = self.bind_scalar(expr)?;
        let pattern_bound = self.bind_scalar(pattern)?;
        match &pattern_bound {
            Expr::Literal(ScalarValue::Utf8(_)) => (),
            Expr::Argument(_) => self.infer_parameter(&pattern_bound, Some(DataType::Utf8)),
            _ => {
                return Err(self.error_at(
                    "LIKE pattern must be a string literal or a parameter",
                    location_of(pattern),
                    &lexeme_of(pattern),
                ));
            }
        }

        let escape = match escape {
            Some(escape) => {
                let escape_bound = self.bind_scalar(escape)?;
                match &escape_bound {
                    Expr::Literal(ScalarValue::Utf8(s)) if s.chars().count() == 1 => (),
                    Expr::Argument(_) => {
                        self.infer_parameter(&escape_bound, Some(DataType::Utf8))
                    }
                    _ => {
                        return Err(self.error_at(
                            "ESCAPE must be a single character or a parameter",
                            location_of(escape),
                            &lexeme_of(escape),
                        ));
                    }
                }
                Some(Box::new(escape_bound))
            }
            None => None,
        };

        Ok(Expr::Like {
            expr: Box::new(bound),
            pattern: Box::new(pattern_bound),
            escape,
            negated,
        })
    }

    fn bind_member_of(
        &mut self,
        expr: &ast::Expr,
        negated: bool,
        collection: &PathName,
    ) -> Result<Expr> {
        let path = self.collection_path(collection)?;
        let element = match self.bind_expr(expr)? {
            Expr::Path(element) if element.is_entity() => {
                let element_table = element.entity().map(|e| e.table.name.clone());
                let target_table = path.target.as_ref().map(|e| e.table.name.clone());
                if element_table != target_table {
                    return Err(self.error_at(
                        format!("Element is not of the type held by '{}'", collection),
                        collection.location,
                        &collection.to_string(),
                    ));
                }
                self.entity_keys(element)?
            }
            Expr::Path(_) => {
                return Err(self.error_at(
                    "MEMBER OF element must be an entity or a value",
                    location_of(expr),
                    &lexeme_of(expr),
                ));
            }
            other => {
                let datatype = path.element_columns.first().map(|c| c.datatype.clone());
                let mut other = other;
                self.align(&mut other, datatype);
                vec![other]
            }
        };

        if element.len() != path.element_columns.len() {
            return Err(self.error_at(
                format!(
                    "Element has {} key columns, '{}' expects {}",
                    element.len(),
                    collection,
                    path.element_columns.len()
                ),
                collection.location,
                &collection.to_string(),
            ));
        }

        Ok(Expr::MemberOf(CollectionPredicate {
            collection: self.collection_ref(path),
            element,
            negated,
        }))
    }

    fn bind_is_null(&mut self, expr: &ast::Expr, negated: bool) -> Result<Expr> {
        let op = if negated {
            UnaryOp::IsNotNull
        } else {
            UnaryOp::IsNull
        };

        let columns = match self.bind_expr(expr)? {
            Expr::Path(PathExpr::Id { .. }) => {
                return Err(self.error_at(
                    "Identification variable cannot be NULL",
                    location_of(expr),
                    &lexeme_of(expr),
                ));
            }
            Expr::Path(PathExpr::Embedded(embedded)) => embedded
                .columns
                .iter()
                .map(|c| self.column_expr(embedded.parent, &c.column))
                .collect(),
            Expr::Path(path) if path.is_entity() => self.entity_keys(path)?,
            Expr::Path(_) => {
                return Err(self.error_at(
                    "Use IS EMPTY to test a collection",
                    location_of(expr),
                    &lexeme_of(expr),
                ));
            }
            other => return Ok(Expr::unary(op, other)),
        };

        // Every column must be null for the value to be null.
        let tests = columns.into_iter().map(|c| Expr::unary(op, c));
        let combined = if negated {
            Expr::or_all(tests)
        } else {
            Expr::and_all(tests)
        };
        combined.required("null test columns")
    }

    fn bind_function(&mut self, func: &ast::Function) -> Result<Expr> {
        let name = FunctionName::from_name(&func.name.value);

        if name == FunctionName::Size {
            if !self.allow_size {
                return Err(self.error_at(
                    "SIZE is only supported in SELECT statements",
                    func.location,
                    &func.name.value,
                ));
            }
            let path = match func.args.as_slice() {
                [ast::Expr::Path(path)] => self.collection_path(path)?,
                _ => {
                    return Err(self.error_at(
                        "SIZE expects a single collection path",
                        func.location,
                        &func.name.value,
                    ));
                }
            };
            let counted = self.size_column(&path)?;
            return Ok(Expr::Function(FunctionExpr {
                name,
                args: vec![counted],
                distinct: false,
            }));
        }

        let mut args = Vec::with_capacity(func.args.len());
        for arg in &func.args {
            let bound = self.bind_expr(arg)?;
            let bound = match bound {
                Expr::Path(path) if name == FunctionName::Count && path.is_entity() => self
                    .entity_keys(path)?
                    .into_iter()
                    .next()
                    .required("entity key column")?,
                Expr::Path(_) => {
                    return Err(self.error_at(
                        format!("Function '{}' cannot take a path argument", func.name),
                        location_of(arg),
                        &lexeme_of(arg),
                    ));
                }
                other => other,
            };
            args.push(bound);
        }

        match name {
            FunctionName::Length
            | FunctionName::Lower
            | FunctionName::Upper
            | FunctionName::Concat
            | FunctionName::Substring
            | FunctionName::Locate => {
                for arg in &args {
                    if !matches!(arg.datatype(), Some(DataType::Int32 | DataType::Int64)) {
                        self.infer_parameter(arg, Some(DataType::Utf8));
                    }
                }
            }
            _ => (),
        }

        Ok(Expr::Function(FunctionExpr {
            name,
            args,
            distinct: func.distinct,
        }))
    }

    /// Resolve a path that must name a collection.
    pub(super) fn collection_path(&mut self, path: &PathName) -> Result<CollectionPath> {
        match self.resolve_path(path)? {
            Expr::Path(PathExpr::OneToMany(c) | PathExpr::ElementCollection(c)) => Ok(c),
            _ => Err(self.error_at(
                format!("'{path}' is not a collection"),
                path.location,
                &path.to_string(),
            )),
        }
    }
}

enum Keys {
    Entity(Vec<Expr>),
    Value(Expr),
}

/// Join implied by an equality between two entity paths.
fn comparison_join(left: &Expr, right: &Expr) -> Option<JoinExpr> {
    match (left, right) {
        (
            Expr::Path(PathExpr::Id { item: a, entity: ea }),
            Expr::Path(PathExpr::Id { item: b, entity: eb }),
        ) if a != b && ea.table.name == eb.table.name => Some(JoinExpr {
            kind: JoinKind::Equal,
            parent: *a,
            target: *b,
            columns: ea
                .id_columns()
                .iter()
                .map(|c| JoinColumn {
                    parent: c.clone(),
                    target: c.clone(),
                })
                .collect(),
        }),
        (
            Expr::Path(PathExpr::ManyToOne(p) | PathExpr::KeyManyToOne(p)),
            Expr::Path(PathExpr::Id { item, entity }),
        )
        | (
            Expr::Path(PathExpr::Id { item, entity }),
            Expr::Path(PathExpr::ManyToOne(p) | PathExpr::KeyManyToOne(p)),
        ) if p.parent != *item && p.target.table.name == entity.table.name => Some(JoinExpr {
            kind: JoinKind::ManyToOne,
            parent: p.parent,
            target: *item,
            columns: p.columns.clone(),
        }),
        _ => None,
    }
}

fn bind_literal(literal: &Literal) -> ScalarValue {
    match literal {
        Literal::Integer(v) => match i32::try_from(*v) {
            Ok(v) => ScalarValue::Int32(v),
            Err(_) => ScalarValue::Int64(*v),
        },
        Literal::Long(v) => ScalarValue::Int64(*v),
        Literal::Double(v) => ScalarValue::Float64(*v),
        Literal::String(s) => ScalarValue::Utf8(s.clone()),
        Literal::Boolean(b) => ScalarValue::Boolean(*b),
    }
}

pub(super) fn location_of(expr: &ast::Expr) -> Location {
    match expr {
        ast::Expr::Path(path) => path.location,
        ast::Expr::Function(func) => func.location,
        ast::Expr::Nested(inner) => location_of(inner),
        ast::Expr::BinaryExpr { left, .. } => location_of(left),
        ast::Expr::Between { expr, .. }
        | ast::Expr::Like { expr, .. }
        | ast::Expr::InList { expr, .. }
        | ast::Expr::InSubquery { expr, .. }
        | ast::Expr::MemberOf { expr, .. }
        | ast::Expr::IsNull { expr, .. } => location_of(expr),
        ast::Expr::IsEmpty { path, .. } => path.location,
        _ => Location::default(),
    }
}

pub(super) fn lexeme_of(expr: &ast::Expr) -> String {
    match expr {
        ast::Expr::Path(path) => path.to_string(),
        ast::Expr::Function(func) => func.name.value.clone(),
        ast::Expr::Nested(inner) => lexeme_of(inner),
        ast::Expr::BinaryExpr { left, .. } => lexeme_of(left),
        ast::Expr::Between { expr, .. }
        | ast::Expr::Like { expr, .. }
        | ast::Expr::InList { expr, .. }
        | ast::Expr::InSubquery { expr, .. }
        | ast::Expr::MemberOf { expr, .. }
        | ast::Expr::IsNull { expr, .. } => lexeme_of(expr),
        ast::Expr::IsEmpty { path, .. } => path.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use pathql_parser::parse;

    use super::super::bind_statement;
    use crate::dialect::Dialect;
    use crate::expr::{CollectionKind, Expr, JoinKind, UnaryOp};
    use crate::query::{BoundStatement, CompiledQuery};
    use crate::testutil::fixture_catalog;
    use crate::value::DataType;

    fn bind(query: &str) -> CompiledQuery {
        let catalog = fixture_catalog();
        let statement = parse(query).unwrap();
        bind_statement(&catalog, query, &statement, &Dialect::default()).unwrap()
    }

    fn where_clause(query: &str) -> Expr {
        match bind(query).statement() {
            BoundStatement::Select(body) => body.where_clause.clone().unwrap(),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn member_of_entity_uses_element_keys() {
        let query = "SELECT o FROM Order o, OrderItem i WHERE i MEMBER OF o.items";
        let pred = match where_clause(query) {
            Expr::MemberOf(pred) => pred,
            other => panic!("unexpected predicate: {other:?}"),
        };
        assert!(!pred.negated);
        assert_eq!(CollectionKind::OneToMany, pred.collection.path.kind);
        assert_eq!("order_items", pred.collection.path.table.name);
        assert_eq!("items", pred.collection.alias);
        assert_eq!(1, pred.element.len());
    }

    #[test]
    fn member_of_value_infers_parameter_type() {
        let compiled = bind("SELECT o FROM Order o WHERE ?1 NOT MEMBER OF o.products");
        assert_eq!(Some(DataType::Int64), compiled.parameters()[0].datatype);
        match compiled.statement() {
            BoundStatement::Select(body) => match &body.where_clause {
                Some(Expr::MemberOf(pred)) => {
                    assert!(pred.negated);
                    assert_eq!(CollectionKind::ManyToMany, pred.collection.path.kind);
                    assert_eq!("order_products", pred.collection.path.table.name);
                }
                other => panic!("unexpected predicate: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn is_empty_reserves_collection_alias() {
        let compiled =
            bind("SELECT o FROM Order o JOIN o.items items WHERE o.items IS NOT EMPTY");
        match compiled.statement() {
            BoundStatement::Select(body) => match &body.where_clause {
                Some(Expr::Empty(pred)) => {
                    assert!(pred.negated);
                    assert!(pred.element.is_empty());
                    assert_eq!("items1", pred.collection.alias);
                }
                other => panic!("unexpected predicate: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn boolean_field_is_a_condition() {
        let pred = where_clause("SELECT r FROM RushOrder r WHERE NOT r.express");
        match pred {
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => assert!(matches!(*expr, Expr::BooleanColumn(ref col) if col.column == "express")),
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn null_test_on_relationship_reads_foreign_key() {
        let compiled = bind("SELECT o FROM Order o WHERE o.customer IS NULL");
        assert_eq!(1, compiled.from_count());
        match compiled.statement() {
            BoundStatement::Select(body) => match &body.where_clause {
                Some(Expr::Unary {
                    op: UnaryOp::IsNull,
                    expr,
                }) => {
                    assert!(matches!(**expr, Expr::Column(ref col) if col.column == "customer_id"))
                }
                other => panic!("unexpected predicate: {other:?}"),
            },
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn entity_equality_becomes_join() {
        let pred = where_clause("SELECT o FROM Order o, Customer c WHERE o.customer = c");
        match pred {
            Expr::Join(join) => assert_eq!(JoinKind::ManyToOne, join.kind),
            other => panic!("unexpected predicate: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_conditions() {
        let cases = [
            (
                "SELECT o FROM Order o WHERE o IS NULL",
                "Identification variable cannot be NULL",
            ),
            ("SELECT o FROM Order o WHERE o.items IS NULL", "Use IS EMPTY"),
            ("SELECT o FROM Order o WHERE o.number", "Expression is not a condition"),
            (
                "SELECT o FROM Order o WHERE o.customer",
                "Path cannot be used as a condition",
            ),
            (
                "SELECT o FROM Order o, Product p WHERE p MEMBER OF o.items",
                "Element is not of the type",
            ),
            ("SELECT o FROM Order o WHERE o.number IS EMPTY", "is not a collection"),
            ("SELECT o FROM Order o WHERE SIZE(o.number) > 1", "is not a collection"),
            (
                "SELECT o FROM Order o WHERE o.customer + 1 = 2",
                "cannot be applied to a path",
            ),
        ];

        let catalog = fixture_catalog();
        for (query, expected) in cases {
            let statement = parse(query).unwrap();
            let err = bind_statement(&catalog, query, &statement, &Dialect::default())
                .unwrap_err()
                .to_string();
            assert!(err.contains(expected), "query: {query}\nerror: {err}");
        }
    }
}
