use std::sync::Arc;

use pathql_error::{QueryError, Result};

use super::{ColumnExpr, Expr, JoinColumn};
use crate::catalog::{Column, EmbeddedColumn, EntityType, Table};
use crate::query::from_item::FromItemId;

/// Navigation from a parent item through a to-one relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct ToOnePath {
    pub parent: FromItemId,
    pub field: String,
    pub target: Arc<EntityType>,
    /// Parent column and the matching target column.
    pub columns: Vec<JoinColumn>,
    /// Target item, once materialized.
    pub item: Option<FromItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    OneToMany,
    ManyToMany,
    Element,
}

/// Navigation from a parent item to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPath {
    pub parent: FromItemId,
    pub field: String,
    pub kind: CollectionKind,
    /// Table with one row per element: the child, link or element table.
    pub table: Arc<Table>,
    /// Parent column and the matching column of `table`.
    pub owner_columns: Vec<JoinColumn>,
    /// Columns of `table` identifying an element.
    pub element_columns: Vec<Column>,
    /// Element entity, None for element collections.
    pub target: Option<Arc<EntityType>>,
    /// Many-to-many only. Link table column and the matching target column.
    pub target_columns: Vec<JoinColumn>,
}

/// A collection used in a correlated EXISTS, with the alias of its table.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRef {
    pub path: CollectionPath,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPath {
    pub parent: FromItemId,
    pub field: String,
    pub type_name: String,
    pub columns: Vec<EmbeddedColumn>,
}

impl EmbeddedPath {
    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .map(|c| &c.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathExpr {
    /// The root of a From-Item, i.e. an identification variable.
    Id {
        item: FromItemId,
        entity: Arc<EntityType>,
    },
    ManyToOne(ToOnePath),
    /// Many-to-one whose foreign key is part of the parent's identifier.
    KeyManyToOne(ToOnePath),
    /// One-to-one where the target holds the foreign key.
    DependentOneToOne(ToOnePath),
    /// One-to-many and many-to-many collections.
    OneToMany(CollectionPath),
    ElementCollection(CollectionPath),
    Embedded(EmbeddedPath),
}

impl PathExpr {
    /// Item the path starts at.
    pub fn parent_item(&self) -> FromItemId {
        match self {
            Self::Id { item, .. } => *item,
            Self::ManyToOne(p) | Self::KeyManyToOne(p) | Self::DependentOneToOne(p) => p.parent,
            Self::OneToMany(p) | Self::ElementCollection(p) => p.parent,
            Self::Embedded(p) => p.parent,
        }
    }

    /// Every item this path references.
    pub fn items(&self) -> Vec<FromItemId> {
        match self {
            Self::Id { item, .. } => vec![*item],
            Self::ManyToOne(p) | Self::KeyManyToOne(p) | Self::DependentOneToOne(p) => {
                let mut items = vec![p.parent];
                items.extend(p.item);
                items
            }
            Self::OneToMany(p) | Self::ElementCollection(p) => vec![p.parent],
            Self::Embedded(p) => vec![p.parent],
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::OneToMany(_) | Self::ElementCollection(_))
    }

    pub fn is_entity(&self) -> bool {
        matches!(
            self,
            Self::Id { .. }
                | Self::ManyToOne(_)
                | Self::KeyManyToOne(_)
                | Self::DependentOneToOne(_)
        )
    }

    pub fn entity(&self) -> Option<&Arc<EntityType>> {
        match self {
            Self::Id { entity, .. } => Some(entity),
            Self::ManyToOne(p) | Self::KeyManyToOne(p) | Self::DependentOneToOne(p) => {
                Some(&p.target)
            }
            Self::OneToMany(p) | Self::ElementCollection(p) => p.target.as_ref(),
            Self::Embedded(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionPath> {
        match self {
            Self::OneToMany(p) | Self::ElementCollection(p) => Some(p),
            _ => None,
        }
    }

    /// Column expressions holding the identity of the referenced entity.
    ///
    /// A many-to-one path is identified by the foreign key on its parent, so
    /// no join is needed. A dependent one-to-one must be materialized first
    /// since the key lives on the target's table.
    pub fn key_exprs(&self) -> Result<Vec<Expr>> {
        match self {
            Self::Id { item, entity } => Ok(id_columns(*item, entity)),
            Self::ManyToOne(p) | Self::KeyManyToOne(p) => {
                let key = matches!(self, Self::KeyManyToOne(_));
                Ok(p.columns
                    .iter()
                    .map(|c| {
                        let datatype = p
                            .target
                            .table
                            .column(&c.target)
                            .map(|col| col.datatype.clone())
                            .unwrap_or(crate::value::DataType::Int64);
                        Expr::Column(ColumnExpr {
                            from: p.parent,
                            column: c.parent.clone(),
                            datatype,
                            key,
                        })
                    })
                    .collect())
            }
            Self::DependentOneToOne(p) => match p.item {
                Some(item) => Ok(id_columns(item, &p.target)),
                None => Err(QueryError::unsupported(format!(
                    "Dependent path '{}' must be joined before it can be compared",
                    p.field
                ))),
            },
            Self::OneToMany(p) | Self::ElementCollection(p) => Err(QueryError::unsupported(
                format!("Collection path '{}' has no scalar value", p.field),
            )),
            Self::Embedded(p) => Err(QueryError::unsupported(format!(
                "Embedded path '{}' has no scalar value",
                p.field
            ))),
        }
    }
}

fn id_columns(item: FromItemId, entity: &EntityType) -> Vec<Expr> {
    entity
        .id_columns()
        .iter()
        .filter_map(|name| entity.table.column(name))
        .map(|col| {
            Expr::Column(ColumnExpr {
                from: item,
                column: col.name.clone(),
                datatype: col.datatype.clone(),
                key: true,
            })
        })
        .collect()
}
