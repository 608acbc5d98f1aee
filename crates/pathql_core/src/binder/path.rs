use std::sync::Arc;

use pathql_error::{OptionExt, Result};
use pathql_parser::ast::{Ident, PathName};

use super::{AliasEntry, Binder};
use crate::catalog::{Column, EntityType, Field, FieldKind, Table};
use crate::expr::{
    CollectionKind, CollectionPath, CollectionRef, ColumnExpr, EmbeddedPath, EnumExpr, Expr,
    JoinColumn, JoinExpr, JoinKind, PathExpr, ToOnePath,
};
use crate::query::from_item::{FromItemId, JoinSemantics};

impl Binder<'_> {
    /// Resolve a dotted name: an alias and its fields, an enum constant, or a
    /// field of the first From-Item, in that order.
    pub(super) fn resolve_path(&mut self, path: &PathName) -> Result<Expr> {
        if let Some(entry) = self.lookup_alias(&path.first().normalized()) {
            return self.navigate_from(&entry, path, 1);
        }

        if path.segments.len() >= 2 {
            if let Some((constant, type_segments)) = path.segments.split_last() {
                let type_name = type_segments
                    .iter()
                    .map(|s| s.value.as_str())
                    .collect::<Vec<_>>()
                    .join(".");
                if let Some(constant) = self.catalog.resolve_enum(&type_name, &constant.value) {
                    return Ok(Expr::Enum(EnumExpr {
                        type_name: constant.type_name,
                        name: constant.name,
                        ordinal: constant.ordinal,
                        by_name: false,
                    }));
                }
            }
        }

        if let Some(item) = self.first_item() {
            let has_field = self
                .arena
                .get(item)
                .entity
                .as_ref()
                .is_some_and(|e| e.field(&path.first().value).is_some());
            if has_field {
                let entry = AliasEntry {
                    name: String::new(),
                    item,
                    element: None,
                };
                return self.navigate_from(&entry, path, 0);
            }
        }

        Err(self.error_at(
            format!("Unknown table or column '{path}'"),
            path.location,
            &path.first().value,
        ))
    }

    fn navigate_from(&mut self, entry: &AliasEntry, path: &PathName, start: usize) -> Result<Expr> {
        if let Some(column) = &entry.element {
            if path.segments.len() > start {
                return Err(self.error_at(
                    format!("Cannot navigate from collection element '{}'", path.first()),
                    path.location,
                    &path.first().value,
                ));
            }
            return Ok(Expr::Column(ColumnExpr {
                from: entry.item,
                column: column.name.clone(),
                datatype: column.datatype.clone(),
                key: false,
            }));
        }

        let entity = self
            .arena
            .get(entry.item)
            .entity
            .clone()
            .required("entity of aliased From-Item")?;
        let mut current = Expr::Path(PathExpr::Id {
            item: entry.item,
            entity,
        });
        for segment in &path.segments[start..] {
            current = self.navigate(current, segment, path)?;
        }
        Ok(current)
    }

    /// Resolve one field of the value `current` refers to.
    fn navigate(&mut self, current: Expr, segment: &Ident, path: &PathName) -> Result<Expr> {
        let (item, entity) = match current {
            Expr::Path(PathExpr::Id { item, entity }) => (item, entity),
            Expr::Path(PathExpr::ManyToOne(p) | PathExpr::KeyManyToOne(p)) => {
                (self.materialize_to_one(&p, JoinKind::ManyToOne), p.target)
            }
            Expr::Path(PathExpr::DependentOneToOne(p)) => {
                let item = match p.item {
                    Some(item) => item,
                    None => self.materialize_to_one(&p, JoinKind::OneToMany),
                };
                (item, p.target)
            }
            Expr::Path(PathExpr::Embedded(embedded)) => {
                let column = embedded.column(&segment.value).cloned().ok_or_else(|| {
                    self.error_at(
                        format!(
                            "Unknown field '{}' on embedded type '{}'",
                            segment.value, embedded.type_name
                        ),
                        path.location,
                        &segment.value,
                    )
                })?;
                return Ok(self.column_expr(embedded.parent, &column));
            }
            Expr::Path(PathExpr::OneToMany(p) | PathExpr::ElementCollection(p)) => {
                return Err(self.error_at(
                    format!(
                        "Cannot navigate through collection '{}', join it with an alias",
                        p.field
                    ),
                    path.location,
                    &segment.value,
                ));
            }
            _ => {
                return Err(self.error_at(
                    format!("Cannot navigate to '{}' from a scalar value", segment.value),
                    path.location,
                    &segment.value,
                ));
            }
        };

        let field = entity.field(&segment.value).ok_or_else(|| {
            self.error_at(
                format!("Unknown field '{}' on entity '{}'", segment.value, entity.name),
                path.location,
                &segment.value,
            )
        })?;
        self.field_expr(item, field, path)
    }

    fn field_expr(&mut self, item: FromItemId, field: &Field, path: &PathName) -> Result<Expr> {
        let expr = match &field.kind {
            FieldKind::Id { column }
            | FieldKind::KeyProperty { column }
            | FieldKind::Basic { column } => self.column_expr(item, column),
            FieldKind::Embedded { type_name, columns } => {
                Expr::Path(PathExpr::Embedded(EmbeddedPath {
                    parent: item,
                    field: field.name.clone(),
                    type_name: type_name.clone(),
                    columns: columns.clone(),
                }))
            }
            FieldKind::ManyToOne { target, link, key } => {
                let to_one = ToOnePath {
                    parent: item,
                    field: field.name.clone(),
                    target: self.resolve_entity(target, path)?,
                    columns: link
                        .columns
                        .iter()
                        .map(|pair| JoinColumn {
                            parent: pair.source.clone(),
                            target: pair.target.clone(),
                        })
                        .collect(),
                    item: None,
                };
                if *key {
                    Expr::Path(PathExpr::KeyManyToOne(to_one))
                } else {
                    Expr::Path(PathExpr::ManyToOne(to_one))
                }
            }
            FieldKind::DependentOneToOne { target, link } => {
                Expr::Path(PathExpr::DependentOneToOne(ToOnePath {
                    parent: item,
                    field: field.name.clone(),
                    target: self.resolve_entity(target, path)?,
                    columns: reversed_columns(&link.columns),
                    item: None,
                }))
            }
            FieldKind::OneToMany { target, link } => {
                let target = self.resolve_entity(target, path)?;
                Expr::Path(PathExpr::OneToMany(CollectionPath {
                    parent: item,
                    field: field.name.clone(),
                    kind: CollectionKind::OneToMany,
                    table: target.table.clone(),
                    owner_columns: reversed_columns(&link.columns),
                    element_columns: table_columns(&target.table, target.id_columns()),
                    target: Some(target),
                    target_columns: Vec::new(),
                }))
            }
            FieldKind::ManyToMany {
                target,
                link_table,
                source_link,
                target_link,
            } => {
                let target = self.resolve_entity(target, path)?;
                let element: Vec<String> =
                    target_link.columns.iter().map(|p| p.source.clone()).collect();
                Expr::Path(PathExpr::OneToMany(CollectionPath {
                    parent: item,
                    field: field.name.clone(),
                    kind: CollectionKind::ManyToMany,
                    table: link_table.clone(),
                    owner_columns: reversed_columns(&source_link.columns),
                    element_columns: table_columns(link_table, &element),
                    target: Some(target),
                    target_columns: target_link
                        .columns
                        .iter()
                        .map(|pair| JoinColumn {
                            parent: pair.source.clone(),
                            target: pair.target.clone(),
                        })
                        .collect(),
                }))
            }
            FieldKind::ElementCollection {
                table,
                link,
                column,
            } => Expr::Path(PathExpr::ElementCollection(CollectionPath {
                parent: item,
                field: field.name.clone(),
                kind: CollectionKind::Element,
                table: table.clone(),
                owner_columns: reversed_columns(&link.columns),
                element_columns: vec![column.clone()],
                target: None,
                target_columns: Vec::new(),
            })),
        };
        Ok(expr)
    }

    pub(super) fn column_expr(&self, item: FromItemId, column: &Column) -> Expr {
        Expr::Column(ColumnExpr {
            from: item,
            column: column.name.clone(),
            datatype: column.datatype.clone(),
            key: self.arena.get(item).is_id_column(&column.name),
        })
    }

    fn resolve_entity(&self, name: &str, path: &PathName) -> Result<Arc<EntityType>> {
        self.catalog.resolve_entity(name).ok_or_else(|| {
            self.error_at(
                format!("Unknown entity '{name}'"),
                path.location,
                &path.to_string(),
            )
        })
    }

    /// Item for a to-one navigation, shared by every equal navigation visible
    /// from the current scope.
    pub(super) fn materialize_to_one(&mut self, path: &ToOnePath, kind: JoinKind) -> FromItemId {
        if let Some(item) = path.item {
            return item;
        }
        let key = (path.parent, path.field.clone());
        if let Some(item) = self.scopes().find_map(|s| s.to_one.get(&key).copied()) {
            return item;
        }

        let item = self.arena.create(
            &path.field,
            Some(path.target.clone()),
            path.target.table.clone(),
        );
        self.arena.get_mut(item).join = Some(JoinExpr {
            kind,
            parent: path.parent,
            target: item,
            columns: path.columns.clone(),
        });
        self.scope.from_list.push(item);
        self.scope.to_one.insert(key, item);
        item
    }

    /// Materialize a dependent one-to-one so its key can be read.
    pub(super) fn materialize_path(&mut self, path: PathExpr) -> PathExpr {
        match path {
            PathExpr::DependentOneToOne(mut p) if p.item.is_none() => {
                p.item = Some(self.materialize_to_one(&p, JoinKind::OneToMany));
                PathExpr::DependentOneToOne(p)
            }
            other => other,
        }
    }

    /// Key columns identifying the entity a path refers to.
    pub(super) fn entity_keys(&mut self, path: PathExpr) -> Result<Vec<Expr>> {
        self.materialize_path(path).key_exprs()
    }

    /// Explicitly joined to-one navigation. The item is shared with later
    /// implicit navigations of the same path.
    pub(super) fn join_to_one(
        &mut self,
        path: &ToOnePath,
        kind: JoinKind,
        alias: &str,
        semantics: JoinSemantics,
    ) -> FromItemId {
        let item = self.arena.create(
            alias,
            Some(path.target.clone()),
            path.target.table.clone(),
        );
        let from = self.arena.get_mut(item);
        from.join = Some(JoinExpr {
            kind,
            parent: path.parent,
            target: item,
            columns: path.columns.clone(),
        });
        from.join_semantics = semantics;
        self.scope.from_list.push(item);
        self.scope
            .to_one
            .entry((path.parent, path.field.clone()))
            .or_insert(item);
        item
    }

    /// Join the rows of a collection. Returns the element item, and for
    /// element collections the column holding the value.
    pub(super) fn join_collection(
        &mut self,
        path: &CollectionPath,
        alias: &str,
        semantics: JoinSemantics,
    ) -> Result<(FromItemId, Option<Column>)> {
        match path.kind {
            CollectionKind::OneToMany => {
                let item = self.add_joined_item(
                    alias,
                    path.target.clone(),
                    path.table.clone(),
                    owner_join(path),
                    semantics,
                );
                Ok((item, None))
            }
            CollectionKind::ManyToMany => {
                let target = path.target.clone().required("many-to-many target")?;
                let link = self.add_joined_item(
                    &path.table.name,
                    None,
                    path.table.clone(),
                    owner_join(path),
                    semantics,
                );
                let item = self.add_joined_item(
                    alias,
                    Some(target.clone()),
                    target.table.clone(),
                    JoinExpr {
                        kind: JoinKind::ManyToOne,
                        parent: link,
                        target: link,
                        columns: path.target_columns.clone(),
                    },
                    semantics,
                );
                Ok((item, None))
            }
            CollectionKind::Element => {
                let item = self.add_joined_item(
                    alias,
                    None,
                    path.table.clone(),
                    owner_join(path),
                    semantics,
                );
                let column = path
                    .element_columns
                    .first()
                    .cloned()
                    .required("element collection column")?;
                Ok((item, Some(column)))
            }
        }
    }

    /// Join a collection for SIZE and return the column to count. Repeated
    /// SIZE calls on the same collection share the join.
    pub(super) fn size_column(&mut self, path: &CollectionPath) -> Result<Expr> {
        let key = (path.parent, path.field.clone());
        let item = match self.scope.size_items.get(&key).copied() {
            Some(item) => item,
            None => {
                // Link and element tables belong to no entity.
                let entity = match path.kind {
                    CollectionKind::OneToMany => path.target.clone(),
                    CollectionKind::ManyToMany | CollectionKind::Element => None,
                };
                let item = self.add_joined_item(
                    &path.field,
                    entity,
                    path.table.clone(),
                    owner_join(path),
                    JoinSemantics::Unknown,
                );
                self.scope.size_items.insert(key, item);
                item
            }
        };

        let column = match path.kind {
            CollectionKind::OneToMany => path.element_columns.first().cloned(),
            CollectionKind::ManyToMany => path.element_columns.first().cloned(),
            CollectionKind::Element => path
                .owner_columns
                .first()
                .and_then(|c| path.table.column(&c.target).cloned()),
        }
        .required("column counted by SIZE")?;
        let expr = self.column_expr(item, &column);

        // The owner is the grouping key.
        let owner = self.arena.get(path.parent);
        let keys: Vec<Column> = table_columns(&owner.table, owner.id_columns());
        for key in keys {
            let key = self.column_expr(path.parent, &key);
            if !self.scope.group_by.contains(&key) {
                self.scope.group_by.push(key);
            }
        }

        Ok(expr)
    }

    pub(super) fn collection_ref(&mut self, path: CollectionPath) -> CollectionRef {
        let alias = self.arena.unique_alias(&path.field);
        CollectionRef { path, alias }
    }

    fn add_joined_item(
        &mut self,
        alias: &str,
        entity: Option<Arc<EntityType>>,
        table: Arc<Table>,
        join: JoinExpr,
        semantics: JoinSemantics,
    ) -> FromItemId {
        let item = self.arena.create(alias, entity, table);
        let from = self.arena.get_mut(item);
        from.join = Some(JoinExpr {
            target: item,
            ..join
        });
        from.join_semantics = semantics;
        self.scope.from_list.push(item);
        item
    }
}

/// Join from the collection owner to the collection table. The target is
/// filled in once the item exists.
fn owner_join(path: &CollectionPath) -> JoinExpr {
    JoinExpr {
        kind: JoinKind::OneToMany,
        parent: path.parent,
        target: path.parent,
        columns: path.owner_columns.clone(),
    }
}

/// Link columns seen from the referenced table.
fn reversed_columns(pairs: &[crate::catalog::ColumnPair]) -> Vec<JoinColumn> {
    pairs
        .iter()
        .map(|pair| JoinColumn {
            parent: pair.target.clone(),
            target: pair.source.clone(),
        })
        .collect()
}

fn table_columns(table: &Table, names: &[String]) -> Vec<Column> {
    names
        .iter()
        .filter_map(|name| table.column(name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use pathql_parser::parse;

    use super::super::bind_statement;
    use crate::dialect::Dialect;
    use crate::expr::{EnumExpr, Expr};
    use crate::query::{BoundStatement, CompiledQuery};
    use crate::testutil::fixture_catalog;

    fn bind(query: &str) -> CompiledQuery {
        let catalog = fixture_catalog();
        let statement = parse(query).unwrap();
        bind_statement(&catalog, query, &statement, &Dialect::default()).unwrap()
    }

    fn bind_err(query: &str) -> String {
        let catalog = fixture_catalog();
        let statement = parse(query).unwrap();
        bind_statement(&catalog, query, &statement, &Dialect::default())
            .unwrap_err()
            .to_string()
    }

    fn aliases(compiled: &CompiledQuery) -> Vec<(String, String)> {
        compiled
            .arena()
            .iter()
            .map(|item| (item.alias.clone(), item.table.name.clone()))
            .collect()
    }

    fn where_clause(compiled: &CompiledQuery) -> &Expr {
        match compiled.statement() {
            BoundStatement::Select(body) => body.where_clause.as_ref().unwrap(),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn equal_navigations_share_item() {
        let compiled =
            bind("SELECT o FROM Order o WHERE o.customer.name = 'a' OR o.customer.id = 1");
        assert_eq!(
            vec![
                ("o".to_string(), "orders".to_string()),
                ("customer".to_string(), "customers".to_string()),
            ],
            aliases(&compiled)
        );
    }

    #[test]
    fn navigated_item_avoids_reserved_alias() {
        let compiled = bind("SELECT i FROM OrderItem i WHERE i.order.number = 'a'");
        assert_eq!(
            vec![
                ("i".to_string(), "order_items".to_string()),
                ("order1".to_string(), "orders".to_string()),
            ],
            aliases(&compiled)
        );
    }

    #[test]
    fn size_item_belongs_to_element_entity() {
        let compiled = bind("SELECT o FROM Order o WHERE SIZE(o.items) > 1");
        let item = compiled
            .arena()
            .iter()
            .find(|item| item.table.name == "order_items")
            .unwrap();
        assert_eq!(Some("OrderItem"), item.entity.as_ref().map(|e| e.name.as_str()));

        let compiled = bind("SELECT o FROM Order o WHERE SIZE(o.products) > 1");
        let link = compiled
            .arena()
            .iter()
            .find(|item| item.table.name == "order_products")
            .unwrap();
        assert!(link.entity.is_none());
    }

    #[test]
    fn enum_constant_resolves_to_ordinal() {
        let compiled = bind("SELECT o FROM Order o WHERE o.status = com.acme.Status.SHIPPED");
        let found = where_clause(&compiled).any(&mut |e| {
            matches!(e, Expr::Enum(EnumExpr { ordinal: 2, by_name: false, .. }))
        });
        assert!(found, "{:?}", where_clause(&compiled));
    }

    #[test]
    fn unqualified_field_uses_first_item() {
        let compiled = bind("SELECT o FROM Order o WHERE number = 'a'");
        assert_eq!(1, compiled.from_count());
        let found = where_clause(&compiled)
            .any(&mut |e| matches!(e, Expr::Column(col) if col.column == "number"));
        assert!(found);
    }

    #[test]
    fn element_collection_alias_is_a_column() {
        let compiled = bind("SELECT c FROM Customer c, IN(c.tags) t WHERE t = 'vip'");
        assert_eq!(
            vec![
                ("c".to_string(), "customers".to_string()),
                ("t".to_string(), "customer_tags".to_string()),
            ],
            aliases(&compiled)
        );
        let found = where_clause(&compiled)
            .any(&mut |e| matches!(e, Expr::Column(col) if col.column == "tag"));
        assert!(found);
    }

    #[test]
    fn rejects_invalid_navigation() {
        let cases = [
            (
                "SELECT o FROM Order o WHERE o.items.quantity = 1",
                "Cannot navigate through collection",
            ),
            (
                "SELECT c FROM Customer c, IN(c.tags) t WHERE t.x = 1",
                "Cannot navigate from collection element",
            ),
            (
                "SELECT o FROM Order o WHERE o.address.zip = 'a'",
                "Unknown field 'zip' on embedded type",
            ),
            ("SELECT o FROM Order o WHERE o.number.x = 'a'", "from a scalar value"),
            (
                "SELECT o FROM Order o WHERE o.customer.nope = 1",
                "Unknown field 'nope' on entity 'Customer'",
            ),
        ];

        for (query, expected) in cases {
            let err = bind_err(query);
            assert!(err.contains(expected), "query: {query}\nerror: {err}");
        }
    }
}
