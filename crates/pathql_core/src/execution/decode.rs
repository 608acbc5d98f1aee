use pathql_error::{QueryError, Result};

use super::row::{CachedValue, EmbeddedValue, EntityItem};
use super::RowCursor;
use crate::catalog::Column;
use crate::expr::{Expr, LoadExpr};
use crate::query::select::SelectBody;
use crate::value::{DataType, ScalarValue};

/// How one select list entry is read from the result columns.
#[derive(Debug, Clone, PartialEq)]
enum LoadPlan {
    Entity {
        type_name: String,
        columns: Vec<Column>,
        /// Positions of the identifier columns within `columns`.
        key: Vec<usize>,
    },
    Embedded {
        type_name: String,
        fields: Vec<(String, Column)>,
    },
    Basic {
        datatype: Option<DataType>,
    },
}

/// Decodes rows of a compiled SELECT into cacheable values. Entity loads
/// read all of their columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDecoder {
    plans: Vec<LoadPlan>,
}

impl RowDecoder {
    pub fn new(body: &SelectBody) -> Result<Self> {
        let plans = body
            .items
            .iter()
            .map(|item| match item {
                Expr::Load(load) => Ok(plan_for(load)),
                other => Err(QueryError::new(format!(
                    "Select list entry is not a load: {other:?}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RowDecoder { plans })
    }

    /// Number of result columns read per row.
    pub fn column_count(&self) -> usize {
        self.plans
            .iter()
            .map(|plan| match plan {
                LoadPlan::Entity { columns, .. } => columns.len(),
                LoadPlan::Embedded { fields, .. } => fields.len(),
                LoadPlan::Basic { .. } => 1,
            })
            .sum()
    }

    /// Decode the current row of the cursor.
    pub fn decode(&self, cursor: &mut dyn RowCursor) -> Result<Vec<CachedValue>> {
        // Result columns are numbered from 1.
        let mut idx = 1;
        let mut row = Vec::with_capacity(self.plans.len());

        for plan in &self.plans {
            let value = match plan {
                LoadPlan::Entity {
                    type_name,
                    columns,
                    key,
                } => {
                    let mut values = Vec::with_capacity(columns.len());
                    for column in columns {
                        let value = cursor.get(idx, Some(&column.datatype))?;
                        values.push((column.name.clone(), value));
                        idx += 1;
                    }
                    let key: Vec<ScalarValue> =
                        key.iter().map(|&pos| values[pos].1.clone()).collect();
                    if key.iter().all(|v| v.is_null()) {
                        // Outer joined entity without a row.
                        CachedValue::Scalar(ScalarValue::Null)
                    } else {
                        CachedValue::Entity(EntityItem {
                            type_name: type_name.clone(),
                            key,
                            values,
                        })
                    }
                }
                LoadPlan::Embedded { type_name, fields } => {
                    let mut values = Vec::with_capacity(fields.len());
                    for (field, column) in fields {
                        values.push((field.clone(), cursor.get(idx, Some(&column.datatype))?));
                        idx += 1;
                    }
                    CachedValue::Embedded(EmbeddedValue {
                        type_name: type_name.clone(),
                        fields: values,
                    })
                }
                LoadPlan::Basic { datatype } => {
                    let value = cursor.get(idx, datatype.as_ref())?;
                    idx += 1;
                    CachedValue::Scalar(value)
                }
            };
            row.push(value);
        }

        Ok(row)
    }
}

fn plan_for(load: &LoadExpr) -> LoadPlan {
    match load {
        LoadExpr::Entity { entity, .. } => {
            let columns = entity.load_columns();
            let key = entity
                .id_columns()
                .iter()
                .filter_map(|id| columns.iter().position(|c| &c.name == id))
                .collect();
            LoadPlan::Entity {
                type_name: entity.name.clone(),
                columns,
                key,
            }
        }
        LoadExpr::Embedded { path } => LoadPlan::Embedded {
            type_name: path.type_name.clone(),
            fields: path
                .columns
                .iter()
                .map(|c| (c.field.clone(), c.column.clone()))
                .collect(),
        },
        LoadExpr::Basic { expr } => LoadPlan::Basic {
            datatype: expr.datatype(),
        },
    }
}
