//! Resolution of a parsed statement against the schema catalog.
//!
//! Binding turns the syntax tree into bound expressions, creating one
//! From-Item per table occurrence. Equal to-one paths share a From-Item
//! within a scope, so `o.customer` used twice produces a single join.

mod expr;
mod modify;
mod path;
mod select;

use hashbrown::HashMap;
use pathql_error::{ParseDetails, QueryError, Result};
use pathql_parser::ast::{Location, Statement};
use pathql_parser::tokens::Parameter;

use crate::catalog::{Column, SchemaCatalog};
use crate::dialect::Dialect;
use crate::expr::{ArgExpr, Expr, ParamRef};
use crate::query::from_item::{FromArena, FromItemId};
use crate::query::{BoundStatement, CompiledQuery, ParameterInfo};
use crate::value::DataType;

/// Bind a parsed statement, producing a compiled query that still needs to
/// be initialized.
pub fn bind_statement(
    catalog: &dyn SchemaCatalog,
    source: &str,
    statement: &Statement,
    dialect: &Dialect,
) -> Result<CompiledQuery> {
    let mut binder = Binder::new(catalog, source);
    let bound = match statement {
        Statement::Select(select) => BoundStatement::Select(binder.bind_top_select(select)?),
        Statement::Update(update) => BoundStatement::Update(binder.bind_update(update)?),
        Statement::Delete(delete) => BoundStatement::Delete(binder.bind_delete(delete)?),
    };

    let mut parameters = binder.parameters;
    if parameters
        .iter()
        .all(|p| matches!(p.param, ParamRef::Positional(_)))
    {
        parameters.sort_by(|a, b| a.param.cmp(&b.param));
    }

    Ok(CompiledQuery::new(
        source,
        binder.arena,
        bound,
        parameters,
        binder.fetch_hints,
        dialect.clone(),
    ))
}

/// A name declared in a FROM clause.
#[derive(Debug, Clone)]
struct AliasEntry {
    /// Lowercased alias.
    name: String,
    item: FromItemId,
    /// Set for element collection aliases, which stand for a single column.
    element: Option<Column>,
}

/// Names and items of one SELECT level.
#[derive(Debug, Default)]
struct Scope {
    aliases: Vec<AliasEntry>,
    from_list: Vec<FromItemId>,
    /// Materialized to-one navigations, keyed by parent item and field.
    to_one: HashMap<(FromItemId, String), FromItemId>,
    /// Collections joined for SIZE.
    size_items: HashMap<(FromItemId, String), FromItemId>,
    /// Grouping keys required by SIZE.
    group_by: Vec<Expr>,
}

struct Binder<'a> {
    catalog: &'a dyn SchemaCatalog,
    source: &'a str,
    arena: FromArena,
    parameters: Vec<ParameterInfo>,
    fetch_hints: Vec<String>,
    scope: Scope,
    outer: Vec<Scope>,
    /// SIZE is rewritten into GROUP BY/HAVING, only possible for selects.
    allow_size: bool,
}

impl<'a> Binder<'a> {
    fn new(catalog: &'a dyn SchemaCatalog, source: &'a str) -> Self {
        Binder {
            catalog,
            source,
            arena: FromArena::default(),
            parameters: Vec::new(),
            fetch_hints: Vec::new(),
            scope: Scope::default(),
            outer: Vec::new(),
            allow_size: true,
        }
    }

    fn push_scope(&mut self) {
        let outer = std::mem::take(&mut self.scope);
        self.outer.push(outer);
    }

    fn pop_scope(&mut self) -> Scope {
        let outer = self.outer.pop().unwrap_or_default();
        std::mem::replace(&mut self.scope, outer)
    }

    /// Scopes from the innermost outwards.
    fn scopes(&self) -> impl Iterator<Item = &Scope> {
        std::iter::once(&self.scope).chain(self.outer.iter().rev())
    }

    fn lookup_alias(&self, name: &str) -> Option<AliasEntry> {
        self.scopes()
            .find_map(|scope| scope.aliases.iter().find(|a| a.name == name))
            .cloned()
    }

    /// First declared item of the innermost scope that has one.
    fn first_item(&self) -> Option<FromItemId> {
        self.scopes().find_map(|scope| scope.from_list.first().copied())
    }

    fn declare_alias(
        &mut self,
        alias: &pathql_parser::ast::Ident,
        item: FromItemId,
        element: Option<Column>,
        location: Location,
    ) -> Result<()> {
        let name = alias.normalized();
        if self.scope.aliases.iter().any(|a| a.name == name) {
            return Err(self.error_at(
                format!("Duplicate alias '{}'", alias.value),
                location,
                &alias.value,
            ));
        }
        self.scope.aliases.push(AliasEntry {
            name,
            item,
            element,
        });
        Ok(())
    }

    fn error_at(&self, msg: impl Into<String>, location: Location, lexeme: &str) -> QueryError {
        QueryError::bind(msg).with_details(ParseDetails {
            lexeme: lexeme.to_string(),
            expected: None,
            source_text: self.source.to_string(),
            offset: location.offset,
            line: location.line,
            col: location.col,
        })
    }

    fn bind_parameter(&mut self, param: &Parameter) -> Result<Expr> {
        let param = match param {
            Parameter::Positional(Some(idx)) => ParamRef::Positional(*idx),
            Parameter::Positional(None) => {
                return Err(QueryError::new("Positional parameter without an index"));
            }
            Parameter::Named(name) => ParamRef::Named(name.clone()),
        };
        if !self.parameters.iter().any(|p| p.param == param) {
            self.parameters.push(ParameterInfo {
                param: param.clone(),
                datatype: None,
            });
        }
        Ok(Expr::Argument(ArgExpr { param }))
    }

    /// Record the type of a parameter from the expression it is used with.
    /// The first usage wins.
    fn infer_parameter(&mut self, expr: &Expr, datatype: Option<DataType>) {
        let (Expr::Argument(arg), Some(datatype)) = (expr, datatype) else {
            return;
        };
        if let Some(info) = self.parameters.iter_mut().find(|p| p.param == arg.param) {
            if info.datatype.is_none() {
                info.datatype = Some(datatype);
            }
        }
    }

    /// Align an expression with the type of the value it is compared with or
    /// assigned to.
    fn align(&mut self, expr: &mut Expr, datatype: Option<DataType>) {
        if let (Expr::Enum(e), Some(DataType::Enum(mapping))) = (&mut *expr, &datatype) {
            e.by_name = mapping.by_name;
        }
        self.infer_parameter(expr, datatype);
    }
}
