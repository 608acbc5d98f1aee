//! Test utilities.
//!
//! Note this isn't behind a `#[cfg(test)]` flag since integration tests and
//! the command line tool use the fixture schema.
//!
//! Should not be used outside of tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use pathql_error::{QueryError, Result};

use crate::catalog::MemoryCatalog;
use crate::execution::{
    EntityItem, ExecutionBackend, PreparedStatement, ResultValue, RowCursor, Session,
};
use crate::value::{DataType, ScalarValue};

/// Schema of a small order system.
///
/// `Order`, `RushOrder`, `Customer`, `OrderItem` and `Country` results may be
/// cached, `Product` and `Profile` results may not. `Country` is read only.
/// `RushOrder` shares the orders table, told apart by `kind`.
pub const FIXTURE_SCHEMA: &str = r#"{
  "enums": [
    {"type_name": "com.acme.Status", "constants": ["NEW", "PAID", "SHIPPED"]}
  ],
  "tables": [
    {
      "name": "orders",
      "columns": [
        {"name": "id", "datatype": "int64"},
        {"name": "number", "datatype": "utf8"},
        {"name": "total", "datatype": "float64"},
        {"name": "status", "datatype": {"enum": {"type_name": "com.acme.Status"}}},
        {"name": "customer_id", "datatype": "int64"},
        {"name": "street", "datatype": "utf8"},
        {"name": "city", "datatype": "utf8"},
        {"name": "kind", "datatype": "utf8"},
        {"name": "express", "datatype": "boolean"}
      ],
      "id_columns": ["id"],
      "outgoing_links": [
        {"name": "fk_order_customer", "target_table": "customers",
         "columns": [{"source": "customer_id", "target": "id"}]}
      ]
    },
    {
      "name": "customers",
      "columns": [
        {"name": "id", "datatype": "int64"},
        {"name": "name", "datatype": "utf8"},
        {"name": "country_code", "datatype": "utf8"}
      ],
      "id_columns": ["id"],
      "outgoing_links": [
        {"name": "fk_customer_country", "target_table": "countries",
         "columns": [{"source": "country_code", "target": "code"}]}
      ]
    },
    {
      "name": "order_items",
      "columns": [
        {"name": "id", "datatype": "int64"},
        {"name": "order_id", "datatype": "int64"},
        {"name": "product_id", "datatype": "int64"},
        {"name": "quantity", "datatype": "int32"}
      ],
      "id_columns": ["id"],
      "outgoing_links": [
        {"name": "fk_item_order", "target_table": "orders",
         "columns": [{"source": "order_id", "target": "id"}]},
        {"name": "fk_item_product", "target_table": "products",
         "columns": [{"source": "product_id", "target": "id"}]}
      ]
    },
    {
      "name": "products",
      "columns": [
        {"name": "id", "datatype": "int64"},
        {"name": "name", "datatype": "utf8"},
        {"name": "price", "datatype": "float64"}
      ],
      "id_columns": ["id"]
    },
    {
      "name": "order_products",
      "columns": [
        {"name": "order_id", "datatype": "int64"},
        {"name": "product_id", "datatype": "int64"}
      ],
      "id_columns": ["order_id", "product_id"],
      "outgoing_links": [
        {"name": "fk_op_order", "target_table": "orders",
         "columns": [{"source": "order_id", "target": "id"}]},
        {"name": "fk_op_product", "target_table": "products",
         "columns": [{"source": "product_id", "target": "id"}]}
      ]
    },
    {
      "name": "profiles",
      "columns": [
        {"name": "id", "datatype": "int64"},
        {"name": "customer_id", "datatype": "int64"},
        {"name": "bio", "datatype": "utf8"}
      ],
      "id_columns": ["id"],
      "outgoing_links": [
        {"name": "fk_profile_customer", "target_table": "customers",
         "columns": [{"source": "customer_id", "target": "id"}]}
      ]
    },
    {
      "name": "customer_tags",
      "columns": [
        {"name": "customer_id", "datatype": "int64"},
        {"name": "tag", "datatype": "utf8"}
      ],
      "id_columns": ["customer_id", "tag"],
      "outgoing_links": [
        {"name": "fk_tag_customer", "target_table": "customers",
         "columns": [{"source": "customer_id", "target": "id"}]}
      ]
    },
    {
      "name": "countries",
      "columns": [
        {"name": "code", "datatype": "utf8"},
        {"name": "name", "datatype": "utf8"}
      ],
      "id_columns": ["code"]
    }
  ],
  "entities": [
    {
      "name": "Order",
      "table": "orders",
      "cache_timeout_ms": 60000,
      "fields": [
        {"name": "id", "kind": {"id": {"column": "id"}}},
        {"name": "number", "kind": {"basic": {"column": "number"}}},
        {"name": "total", "kind": {"basic": {"column": "total"}}},
        {"name": "status", "kind": {"basic": {"column": "status"}}},
        {"name": "customer", "kind": {"many_to_one": {"target": "Customer"}}},
        {"name": "address", "kind": {"embedded": {"type_name": "Address", "columns": [
          {"field": "street", "column": "street"},
          {"field": "city", "column": "city"}
        ]}}},
        {"name": "items", "kind": {"one_to_many": {"target": "OrderItem"}}},
        {"name": "products", "kind": {"many_to_many": {"target": "Product", "link_table": "order_products"}}}
      ]
    },
    {
      "name": "RushOrder",
      "table": "orders",
      "discriminator": {"column": "kind", "value": "RUSH"},
      "cache_timeout_ms": 10000,
      "fields": [
        {"name": "id", "kind": {"id": {"column": "id"}}},
        {"name": "number", "kind": {"basic": {"column": "number"}}},
        {"name": "express", "kind": {"basic": {"column": "express"}}},
        {"name": "customer", "kind": {"many_to_one": {"target": "Customer"}}}
      ]
    },
    {
      "name": "Customer",
      "table": "customers",
      "cache_timeout_ms": 60000,
      "fields": [
        {"name": "id", "kind": {"id": {"column": "id"}}},
        {"name": "name", "kind": {"basic": {"column": "name"}}},
        {"name": "country", "kind": {"many_to_one": {"target": "Country"}}},
        {"name": "profile", "kind": {"dependent_one_to_one": {"target": "Profile"}}},
        {"name": "tags", "kind": {"element_collection": {"table": "customer_tags", "column": "tag"}}},
        {"name": "orders", "kind": {"one_to_many": {"target": "Order"}}}
      ]
    },
    {
      "name": "OrderItem",
      "table": "order_items",
      "cache_timeout_ms": 30000,
      "fields": [
        {"name": "id", "kind": {"id": {"column": "id"}}},
        {"name": "quantity", "kind": {"basic": {"column": "quantity"}}},
        {"name": "order", "kind": {"many_to_one": {"target": "Order"}}},
        {"name": "product", "kind": {"many_to_one": {"target": "Product"}}}
      ]
    },
    {
      "name": "Product",
      "table": "products",
      "fields": [
        {"name": "id", "kind": {"id": {"column": "id"}}},
        {"name": "name", "kind": {"basic": {"column": "name"}}},
        {"name": "price", "kind": {"basic": {"column": "price"}}}
      ]
    },
    {
      "name": "Profile",
      "table": "profiles",
      "fields": [
        {"name": "id", "kind": {"id": {"column": "id"}}},
        {"name": "bio", "kind": {"basic": {"column": "bio"}}},
        {"name": "customer", "kind": {"many_to_one": {"target": "Customer"}}}
      ]
    },
    {
      "name": "Country",
      "table": "countries",
      "read_only": true,
      "cache_timeout_ms": 300000,
      "fields": [
        {"name": "code", "kind": {"id": {"column": "code"}}},
        {"name": "name", "kind": {"basic": {"column": "name"}}}
      ]
    }
  ]
}"#;

pub fn fixture_catalog() -> MemoryCatalog {
    MemoryCatalog::from_json(FIXTURE_SCHEMA).unwrap()
}

/// A statement executed by the memory backend with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub values: Vec<ScalarValue>,
}

#[derive(Debug, Default)]
struct BackendState {
    rows: Vec<Vec<ScalarValue>>,
    update_count: u64,
    failure: Option<String>,
    executed: Vec<ExecutedStatement>,
}

/// Backend returning scripted rows for every query.
///
/// A trailing `LIMIT n` or `OFFSET m` in the SQL is applied to the scripted
/// rows.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&self, rows: Vec<Vec<ScalarValue>>) {
        self.state.lock().rows = rows;
    }

    pub fn set_update_count(&self, count: u64) {
        self.state.lock().update_count = count;
    }

    /// Fail every execution with the message until cleared.
    pub fn set_failure(&self, failure: Option<&str>) {
        self.state.lock().failure = failure.map(|s| s.to_string());
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state.lock().executed.clone()
    }

    pub fn execution_count(&self) -> usize {
        self.state.lock().executed.len()
    }
}

impl ExecutionBackend for MemoryBackend {
    fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        Ok(Box::new(MemoryStatement {
            sql: sql.to_string(),
            values: Vec::new(),
            state: self.state.clone(),
        }))
    }
}

#[derive(Debug)]
struct MemoryStatement {
    sql: String,
    values: Vec<ScalarValue>,
    state: Arc<Mutex<BackendState>>,
}

impl MemoryStatement {
    fn record(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.executed.push(ExecutedStatement {
            sql: self.sql.clone(),
            values: self.values.clone(),
        });
        match &state.failure {
            Some(msg) => Err(QueryError::backend(msg.clone())),
            None => Ok(()),
        }
    }
}

impl PreparedStatement for MemoryStatement {
    fn bind(&mut self, idx: usize, value: &ScalarValue) -> Result<()> {
        if idx == 0 {
            return Err(QueryError::backend("Placeholders are numbered from 1"));
        }
        if self.values.len() < idx {
            self.values.resize(idx, ScalarValue::Null);
        }
        self.values[idx - 1] = value.clone();
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn RowCursor>> {
        self.record()?;
        let rows = self.state.lock().rows.clone();

        let offset = trailing_number(&self.sql, " OFFSET ").unwrap_or(0);
        let limit = trailing_number(&self.sql, " LIMIT ").unwrap_or(usize::MAX);
        let rows = rows.into_iter().skip(offset).take(limit).collect();

        Ok(Box::new(MemoryCursor { rows, pos: None }))
    }

    fn execute_update(&mut self) -> Result<u64> {
        self.record()?;
        Ok(self.state.lock().update_count)
    }
}

fn trailing_number(sql: &str, keyword: &str) -> Option<usize> {
    let (_, rest) = sql.rsplit_once(keyword)?;
    rest.split_whitespace().next()?.parse().ok()
}

#[derive(Debug)]
struct MemoryCursor {
    rows: Vec<Vec<ScalarValue>>,
    pos: Option<usize>,
}

impl RowCursor for MemoryCursor {
    fn next(&mut self) -> Result<bool> {
        let next = self.pos.map_or(0, |p| p + 1);
        self.pos = Some(next);
        Ok(next < self.rows.len())
    }

    fn get(&mut self, idx: usize, _datatype: Option<&DataType>) -> Result<ScalarValue> {
        self.pos
            .and_then(|pos| self.rows.get(pos))
            .and_then(|row| row.get(idx.checked_sub(1)?))
            .cloned()
            .ok_or_else(|| QueryError::backend(format!("No value for column {idx}")))
    }
}

/// Object created by the memory session: a type name and the entity key or
/// constructor arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryObject {
    pub type_name: String,
    pub values: Vec<ScalarValue>,
}

#[derive(Debug, Default)]
pub struct MemorySession {
    write_transaction: AtomicBool,
    loads: AtomicUsize,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_write_transaction(&self, open: bool) {
        self.write_transaction.store(open, Ordering::Relaxed);
    }

    /// Number of entities loaded so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl Session for MemorySession {
    type Object = MemoryObject;

    fn load_entity(&self, item: &EntityItem) -> Result<MemoryObject> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryObject {
            type_name: item.type_name.clone(),
            values: item.key.clone(),
        })
    }

    fn construct(
        &self,
        type_name: &str,
        values: Vec<ResultValue<MemoryObject>>,
    ) -> Result<MemoryObject> {
        let mut args = Vec::with_capacity(values.len());
        for value in values {
            match value {
                ResultValue::Scalar(v) => args.push(v),
                ResultValue::Object(o) => args.extend(o.values),
                ResultValue::Embedded(e) => args.extend(e.fields.into_iter().map(|(_, v)| v)),
            }
        }
        Ok(MemoryObject {
            type_name: type_name.to_string(),
            values: args,
        })
    }

    fn in_write_transaction(&self) -> bool {
        self.write_transaction.load(Ordering::Relaxed)
    }
}
