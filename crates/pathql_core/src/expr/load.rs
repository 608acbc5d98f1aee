use std::sync::Arc;

use pathql_error::Result;

use super::render::{RenderContext, SqlBuffer};
use super::{EmbeddedPath, Expr};
use crate::catalog::{Column, EntityType};
use crate::query::from_item::FromItemId;
use crate::value::DataType;

/// A select list entry materializing a value from the next result columns.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadExpr {
    /// A whole entity read from an item's columns.
    Entity {
        item: FromItemId,
        entity: Arc<EntityType>,
    },
    /// An embedded value read from its owner's columns.
    Embedded { path: EmbeddedPath },
    /// A single scalar column or computed value.
    Basic { expr: Box<Expr> },
}

impl LoadExpr {
    pub fn entity(item: FromItemId, entity: Arc<EntityType>) -> Self {
        LoadExpr::Entity { item, entity }
    }

    pub fn basic(expr: Expr) -> Self {
        LoadExpr::Basic {
            expr: Box::new(expr),
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Basic { expr } => vec![expr.as_ref()],
            _ => Vec::new(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Self::Basic { expr } => vec![expr.as_mut()],
            _ => Vec::new(),
        }
    }

    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Basic { expr } => expr.datatype(),
            _ => None,
        }
    }

    /// Item the loaded columns are read from, if any.
    pub fn item(&self) -> Option<FromItemId> {
        match self {
            Self::Entity { item, .. } => Some(*item),
            Self::Embedded { path } => Some(path.parent),
            Self::Basic { .. } => None,
        }
    }

    /// Columns selected for an entity or embedded load. Key-only loads read
    /// just the identifier columns.
    pub fn columns(&self, full: bool) -> Vec<Column> {
        match self {
            Self::Entity { entity, .. } => {
                if full {
                    entity.load_columns()
                } else {
                    entity
                        .id_columns()
                        .iter()
                        .filter_map(|name| entity.table.column(name))
                        .cloned()
                        .collect()
                }
            }
            Self::Embedded { path } => path.columns.iter().map(|c| c.column.clone()).collect(),
            Self::Basic { .. } => Vec::new(),
        }
    }

    /// Number of result columns this load consumes.
    pub fn column_count(&self, full: bool) -> usize {
        match self {
            Self::Basic { .. } => 1,
            _ => self.columns(full).len(),
        }
    }

    pub fn render(&self, buf: &mut SqlBuffer, ctx: &RenderContext) -> Result<()> {
        let (item, columns) = match self {
            Self::Basic { expr } => return expr.render(buf, ctx),
            Self::Entity { item, .. } => (*item, self.columns(ctx.full_load)),
            Self::Embedded { path } => (path.parent, self.columns(true)),
        };

        for (idx, col) in columns.iter().enumerate() {
            if idx > 0 {
                buf.push_str(", ");
            }
            ctx.write_column(buf, item, &col.name)?;
        }
        Ok(())
    }
}
