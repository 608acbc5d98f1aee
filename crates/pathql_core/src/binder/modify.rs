use pathql_error::Result;
use pathql_parser::ast::{self, DeleteStatement, Ident, Location, UpdateStatement};

use super::Binder;
use super::expr::{lexeme_of, location_of};
use crate::catalog::{Column, FieldKind};
use crate::expr::Expr;
use crate::query::delete::DeleteBody;
use crate::query::from_item::FromItemId;
use crate::query::update::{Assignment, UpdateBody};

impl Binder<'_> {
    pub(super) fn bind_update(&mut self, update: &UpdateStatement) -> Result<UpdateBody> {
        self.allow_size = false;
        let target = self.bind_target(&update.entity, update.alias.as_ref(), update.location)?;

        let mut assignments = Vec::with_capacity(update.assignments.len());
        for assignment in &update.assignments {
            assignments.extend(self.bind_assignment(target, update.alias.as_ref(), assignment)?);
        }

        let where_clause = self.bind_modify_filter(update.selection.as_ref())?;

        Ok(UpdateBody {
            target,
            from_list: self.scope.from_list.clone(),
            assignments,
            where_clause,
        })
    }

    pub(super) fn bind_delete(&mut self, delete: &DeleteStatement) -> Result<DeleteBody> {
        self.allow_size = false;
        let target = self.bind_target(&delete.entity, delete.alias.as_ref(), delete.location)?;
        let where_clause = self.bind_modify_filter(delete.selection.as_ref())?;

        Ok(DeleteBody {
            target,
            from_list: self.scope.from_list.clone(),
            where_clause,
        })
    }

    fn bind_target(
        &mut self,
        entity: &Ident,
        alias: Option<&Ident>,
        location: Location,
    ) -> Result<FromItemId> {
        let entity_type = self.lookup_entity(entity, location)?;
        let name = alias.map(|a| a.value.as_str()).unwrap_or("t");
        let item = self
            .arena
            .create(name, Some(entity_type.clone()), entity_type.table.clone());
        if let Some(alias) = alias {
            self.declare_alias(alias, item, None, location)?;
        }
        self.scope.from_list.push(item);
        Ok(item)
    }

    fn bind_modify_filter(&mut self, selection: Option<&ast::Expr>) -> Result<Option<Expr>> {
        let Some(selection) = selection else {
            return Ok(None);
        };
        let bound = self.bind_predicate(selection)?;
        if bound.contains_aggregate() {
            return Err(self.error_at(
                "Aggregate functions are not allowed in WHERE",
                location_of(selection),
                &lexeme_of(selection),
            ));
        }
        Ok(Some(bound))
    }

    /// Bind `field = value`. A many-to-one field assigns each of its foreign
    /// key columns.
    fn bind_assignment(
        &mut self,
        target: FromItemId,
        alias: Option<&Ident>,
        assignment: &ast::Assignment,
    ) -> Result<Vec<Assignment>> {
        let path = &assignment.target;
        let mut segments = path.segments.as_slice();
        if let (Some(alias), [first, rest @ ..]) = (alias, segments) {
            if !rest.is_empty() && first.normalized() == alias.normalized() {
                segments = rest;
            }
        }

        let entity = self.arena.get(target).entity.clone();
        let field = match (segments.first(), &entity) {
            (Some(name), Some(entity)) => entity.field(&name.value).cloned(),
            _ => None,
        };
        let Some(field) = field else {
            return Err(self.error_at(
                format!("Unknown field '{path}' in assignment"),
                path.location,
                &path.to_string(),
            ));
        };

        let before = self.scope.from_list.len();
        let mut value = self.bind_scalar(&assignment.value)?;
        if self.scope.from_list.len() != before {
            return Err(self.error_at(
                "Assigned values cannot navigate relationships",
                location_of(&assignment.value),
                &lexeme_of(&assignment.value),
            ));
        }
        if value.contains_aggregate() {
            return Err(self.error_at(
                "Aggregate functions cannot be assigned",
                location_of(&assignment.value),
                &lexeme_of(&assignment.value),
            ));
        }

        let column: Column = match (&field.kind, segments) {
            (FieldKind::Id { .. } | FieldKind::KeyProperty { .. }, [_]) => {
                return Err(self.error_at(
                    format!("Identifier field '{}' cannot be updated", field.name),
                    path.location,
                    &path.to_string(),
                ));
            }
            (FieldKind::Basic { column }, [_]) => column.clone(),
            (FieldKind::Embedded { columns, .. }, [_, name]) => {
                match columns.iter().find(|c| c.field == name.value) {
                    Some(c) => c.column.clone(),
                    None => {
                        return Err(self.error_at(
                            format!("Unknown embedded field '{path}'"),
                            path.location,
                            &name.value,
                        ));
                    }
                }
            }
            (FieldKind::ManyToOne { link, .. }, [_]) => {
                let table = self.arena.get(target).table.clone();
                let columns: Vec<Column> = link
                    .columns
                    .iter()
                    .filter_map(|pair| table.column(&pair.source).cloned())
                    .collect();
                return match (value, columns.as_slice()) {
                    (Expr::Null, _) => Ok(columns
                        .iter()
                        .map(|c| Assignment {
                            column: c.name.clone(),
                            value: Expr::Null,
                        })
                        .collect()),
                    (value @ Expr::Argument(_), [column]) => {
                        self.infer_parameter(&value, Some(column.datatype.clone()));
                        Ok(vec![Assignment {
                            column: column.name.clone(),
                            value,
                        }])
                    }
                    _ => Err(self.error_at(
                        format!(
                            "Relationship '{}' can only be assigned NULL or a single key parameter",
                            field.name
                        ),
                        path.location,
                        &path.to_string(),
                    )),
                };
            }
            _ => {
                return Err(self.error_at(
                    format!("Field '{path}' cannot be assigned"),
                    path.location,
                    &path.to_string(),
                ));
            }
        };

        self.align(&mut value, Some(column.datatype.clone()));
        Ok(vec![Assignment {
            column: column.name,
            value,
        }])
    }
}
