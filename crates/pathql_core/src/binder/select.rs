use std::sync::Arc;

use pathql_error::{QueryError, Result};
use pathql_parser::ast::{self, FromNode, Ident, Location, PathName, SelectItem, SelectStatement};

use super::Binder;
use super::expr::{lexeme_of, location_of};
use crate::catalog::EntityType;
use crate::expr::{Expr, FunctionName, JoinKind, LoadExpr, PathExpr};
use crate::query::from_item::JoinSemantics;
use crate::query::select::{OrderBy, SelectBody};

impl Binder<'_> {
    /// Bind the outermost SELECT. Fetch joins become hints of the compiled
    /// query.
    pub(super) fn bind_top_select(&mut self, select: &SelectStatement) -> Result<SelectBody> {
        self.bind_select(select, true)
    }

    /// Bind a SELECT in the current scope. The caller is responsible for
    /// pushing a fresh scope for subqueries.
    pub(super) fn bind_select(
        &mut self,
        select: &SelectStatement,
        top: bool,
    ) -> Result<SelectBody> {
        let mut fetches = Vec::new();
        for node in &select.from {
            if let Some(fetch) = self.bind_from(node)? {
                fetches.push(fetch);
            }
        }

        let mut where_clause = None;
        let mut size_filters = Vec::new();
        if let Some(selection) = &select.selection {
            let bound = self.bind_predicate(selection)?;
            let mut kept = Vec::new();
            for conjunct in bound.into_conjuncts() {
                if conjunct.contains_size() {
                    size_filters.push(conjunct);
                } else if conjunct.contains_aggregate() {
                    return Err(self.error_at(
                        "Aggregate functions are not allowed in WHERE",
                        location_of(selection),
                        &lexeme_of(selection),
                    ));
                } else {
                    kept.push(conjunct);
                }
            }
            where_clause = Expr::and_all(kept);
        }

        let (items, constructor) = self.bind_select_items(select)?;

        let mut group_by = Vec::new();
        for expr in &select.group_by {
            for key in self.bind_key(expr, "GROUP BY")? {
                if !group_by.contains(&key) {
                    group_by.push(key);
                }
            }
        }

        let having = match &select.having {
            Some(having) => Some(self.bind_predicate(having)?),
            None => None,
        };
        if having.is_some() && group_by.is_empty() && self.scope.group_by.is_empty() {
            let having_ast = select.having.as_ref();
            return Err(self.error_at(
                "HAVING requires a GROUP BY clause",
                having_ast.map(location_of).unwrap_or_default(),
                &having_ast.map(lexeme_of).unwrap_or_default(),
            ));
        }
        let having = Expr::and_all(size_filters.into_iter().chain(having));

        let mut order_by = Vec::new();
        for node in &select.order_by {
            for key in self.bind_key(&node.expr, "ORDER BY")? {
                order_by.push(OrderBy {
                    expr: key,
                    desc: node.desc,
                });
            }
        }

        // Grouping keys required by SIZE.
        for key in std::mem::take(&mut self.scope.group_by) {
            if !group_by.contains(&key) {
                group_by.push(key);
            }
        }

        if top {
            self.check_fetches(&fetches, &items)?;
        }

        Ok(SelectBody {
            distinct: select.distinct,
            items,
            constructor,
            from_list: self.scope.from_list.clone(),
            where_clause,
            group_by,
            having,
            order_by,
            offset: select.offset,
            limit: select.limit,
        })
    }

    /// Declare one FROM entry. Returns the path of a fetch join.
    fn bind_from(&mut self, node: &FromNode) -> Result<Option<PathName>> {
        match node {
            FromNode::Entity {
                entity,
                alias,
                location,
            } => {
                let entity_type = self.lookup_entity(entity, *location)?;
                let name = alias.as_ref().map(|a| a.value.as_str()).unwrap_or("t");
                let item =
                    self.arena
                        .create(name, Some(entity_type.clone()), entity_type.table.clone());
                if let Some(alias) = alias {
                    self.declare_alias(alias, item, None, *location)?;
                }
                self.scope.from_list.push(item);
                Ok(None)
            }
            FromNode::Join {
                kind,
                fetch,
                path,
                alias,
            } => {
                if *fetch && alias.is_none() {
                    return Ok(Some(path.clone()));
                }
                let semantics = match kind {
                    ast::JoinKind::Inner => JoinSemantics::Inner,
                    ast::JoinKind::LeftOuter => JoinSemantics::Outer,
                };
                self.bind_join(path, alias.as_ref(), semantics)?;
                Ok(fetch.then(|| path.clone()))
            }
            FromNode::In { path, alias } => {
                self.bind_join(path, Some(alias), JoinSemantics::Inner)?;
                Ok(None)
            }
        }
    }

    fn bind_join(
        &mut self,
        path: &PathName,
        alias: Option<&Ident>,
        semantics: JoinSemantics,
    ) -> Result<()> {
        let field = path.segments.last().map(|s| s.value.clone()).unwrap_or_default();
        let name = alias.map(|a| a.value.clone()).unwrap_or(field);

        let (item, element) = match self.resolve_path(path)? {
            Expr::Path(PathExpr::ManyToOne(p) | PathExpr::KeyManyToOne(p)) => {
                (self.join_to_one(&p, JoinKind::ManyToOne, &name, semantics), None)
            }
            Expr::Path(PathExpr::DependentOneToOne(p)) => {
                (self.join_to_one(&p, JoinKind::OneToMany, &name, semantics), None)
            }
            Expr::Path(PathExpr::OneToMany(p) | PathExpr::ElementCollection(p)) => {
                self.join_collection(&p, &name, semantics)?
            }
            _ => {
                return Err(self.error_at(
                    format!("'{path}' is not a relationship that can be joined"),
                    path.location,
                    &path.to_string(),
                ));
            }
        };

        if let Some(alias) = alias {
            self.declare_alias(alias, item, element, path.location)?;
        }
        Ok(())
    }

    pub(super) fn lookup_entity(
        &self,
        name: &Ident,
        location: Location,
    ) -> Result<Arc<EntityType>> {
        self.catalog
            .resolve_entity(&name.value)
            .ok_or_else(|| self.error_at(format!("Unknown entity '{name}'"), location, &name.value))
    }

    fn bind_select_items(
        &mut self,
        select: &SelectStatement,
    ) -> Result<(Vec<Expr>, Option<String>)> {
        if select.items.is_empty() {
            let item = self
                .scope
                .from_list
                .first()
                .copied()
                .ok_or_else(|| QueryError::bind("Query selects nothing"))?;
            let entity = self
                .arena
                .get(item)
                .entity
                .clone()
                .ok_or_else(|| QueryError::bind("First FROM entry is not an entity"))?;
            return Ok((vec![Expr::Load(LoadExpr::entity(item, entity))], None));
        }

        let mut items = Vec::with_capacity(select.items.len());
        let mut constructor = None;
        for item in &select.items {
            match item {
                SelectItem::Expr(expr) => items.push(self.bind_select_expr(expr)?),
                SelectItem::Object { alias, location } => {
                    let entry = self
                        .lookup_alias(&alias.normalized())
                        .filter(|entry| entry.element.is_none())
                        .ok_or_else(|| {
                            self.error_at(
                                format!("OBJECT requires an entity alias, got '{alias}'"),
                                *location,
                                &alias.value,
                            )
                        })?;
                    let entity = self.arena.get(entry.item).entity.clone().ok_or_else(|| {
                        self.error_at(
                            format!("'{alias}' is not an entity"),
                            *location,
                            &alias.value,
                        )
                    })?;
                    items.push(Expr::Load(LoadExpr::entity(entry.item, entity)));
                }
                SelectItem::Constructor {
                    type_name,
                    args,
                    location,
                } => {
                    if select.items.len() != 1 {
                        return Err(self.error_at(
                            "NEW must be the only item of the select list",
                            *location,
                            type_name,
                        ));
                    }
                    for arg in args {
                        items.push(self.bind_select_expr(arg)?);
                    }
                    constructor = Some(type_name.clone());
                }
            }
        }

        if self.scope.from_list.is_empty() {
            let only_current = items.iter().all(|item| {
                matches!(
                    item,
                    Expr::Load(LoadExpr::Basic { expr }) if matches!(
                        expr.as_ref(),
                        Expr::Function(f) if matches!(
                            f.name,
                            FunctionName::CurrentDate
                                | FunctionName::CurrentTime
                                | FunctionName::CurrentTimestamp
                        )
                    )
                )
            });
            if !only_current {
                return Err(QueryError::bind(
                    "A query without FROM can only select the current date or time",
                ));
            }
        }

        Ok((items, constructor))
    }

    fn bind_select_expr(&mut self, expr: &ast::Expr) -> Result<Expr> {
        let load = match self.bind_expr(expr)? {
            Expr::Path(PathExpr::Id { item, entity }) => LoadExpr::entity(item, entity),
            Expr::Path(PathExpr::ManyToOne(p) | PathExpr::KeyManyToOne(p)) => {
                let item = self.materialize_to_one(&p, JoinKind::ManyToOne);
                LoadExpr::entity(item, p.target)
            }
            Expr::Path(PathExpr::DependentOneToOne(p)) => {
                let item = self.materialize_to_one(&p, JoinKind::OneToMany);
                LoadExpr::entity(item, p.target)
            }
            Expr::Path(PathExpr::Embedded(path)) => LoadExpr::Embedded { path },
            Expr::Path(_) => {
                return Err(self.error_at(
                    "Collections cannot be selected, join them instead",
                    location_of(expr),
                    &lexeme_of(expr),
                ));
            }
            other => LoadExpr::basic(other),
        };
        Ok(Expr::Load(load))
    }

    /// Bind a grouping or ordering key. Entities expand to their identifier
    /// and embedded values to their columns.
    fn bind_key(&mut self, expr: &ast::Expr, clause: &str) -> Result<Vec<Expr>> {
        match self.bind_expr(expr)? {
            Expr::Path(PathExpr::Embedded(path)) => Ok(path
                .columns
                .iter()
                .map(|c| self.column_expr(path.parent, &c.column))
                .collect()),
            Expr::Path(path) if path.is_entity() => self.entity_keys(path),
            Expr::Path(_) => Err(self.error_at(
                format!("Collections cannot be used in {clause}"),
                location_of(expr),
                &lexeme_of(expr),
            )),
            other => Ok(vec![other]),
        }
    }

    /// Fetch joins are only meaningful for entities returned by the query.
    fn check_fetches(&mut self, fetches: &[PathName], items: &[Expr]) -> Result<()> {
        for fetch in fetches {
            let owner = self.lookup_alias(&fetch.first().normalized());
            let loaded = owner.as_ref().is_some_and(|owner| {
                items.iter().any(|item| {
                    matches!(item, Expr::Load(LoadExpr::Entity { item, .. }) if *item == owner.item)
                })
            });
            if !loaded {
                return Err(self.error_at(
                    format!(
                        "Fetch join '{fetch}' requires '{}' to be selected",
                        fetch.first()
                    ),
                    fetch.location,
                    &fetch.to_string(),
                ));
            }
            self.fetch_hints.push(fetch.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pathql_parser::parse;

    use super::super::bind_statement;
    use crate::dialect::Dialect;
    use crate::query::BoundStatement;
    use crate::testutil::fixture_catalog;

    fn bind_err(query: &str) -> String {
        let catalog = fixture_catalog();
        let statement = parse(query).unwrap();
        bind_statement(&catalog, query, &statement, &Dialect::default())
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn rejects_invalid_selects() {
        let cases = [
            ("SELECT x FROM Order o", "Unknown table or column 'x'"),
            ("SELECT o FROM Nope o", "Unknown entity 'Nope'"),
            ("SELECT o FROM Order o, Customer o", "Duplicate alias 'o'"),
            ("SELECT o.items FROM Order o", "Collections cannot be selected"),
            (
                "SELECT o FROM Order o WHERE COUNT(o) > 1",
                "Aggregate functions are not allowed in WHERE",
            ),
            (
                "SELECT o FROM Order o HAVING o.total > 1",
                "HAVING requires a GROUP BY clause",
            ),
            (
                "SELECT c FROM Order o JOIN FETCH o.customer c",
                "requires 'o' to be selected",
            ),
            (
                "SELECT o FROM Order o WHERE o.customer < ?1",
                "Entities can only be compared for equality",
            ),
            (
                "SELECT o FROM Order o WHERE o.number LIKE o.number",
                "LIKE pattern must be a string literal or a parameter",
            ),
        ];

        for (query, expected) in cases {
            let err = bind_err(query);
            assert!(err.contains(expected), "query: {query}\nerror: {err}");
        }
    }

    #[test]
    fn fetch_join_records_hint() {
        let catalog = fixture_catalog();
        let query = "SELECT o FROM Order o JOIN FETCH o.items";
        let statement = parse(query).unwrap();
        let compiled = bind_statement(&catalog, query, &statement, &Dialect::default()).unwrap();

        assert_eq!(&["o.items".to_string()], compiled.fetch_hints());
        assert_eq!(1, compiled.from_count());
    }

    #[test]
    fn size_moves_to_having() {
        let catalog = fixture_catalog();
        let query = "SELECT o FROM Order o WHERE SIZE(o.items) > 2 AND o.total > 10";
        let statement = parse(query).unwrap();
        let compiled = bind_statement(&catalog, query, &statement, &Dialect::default()).unwrap();

        let body = match compiled.statement() {
            BoundStatement::Select(body) => body,
            other => panic!("unexpected statement: {other:?}"),
        };
        assert!(body.having.as_ref().is_some_and(|h| h.contains_size()));
        assert!(body.where_clause.as_ref().is_some_and(|w| !w.contains_size()));
        assert_eq!(1, body.group_by.len());
    }
}
