//! Execution of compiled queries against a backend, with result caching.

mod decode;
mod row;
mod user_query;

use std::fmt::Debug;

use pathql_error::Result;

pub use self::decode::RowDecoder;
pub use self::row::{CachedValue, EmbeddedValue, EntityItem, ResultRow, ResultValue};
pub use self::user_query::UserQuery;
use crate::value::{DataType, ScalarValue};

/// Database connection that generated SQL runs on.
pub trait ExecutionBackend: Debug + Send + Sync {
    fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;
}

pub trait PreparedStatement: Debug {
    /// Bind a value to a placeholder. Placeholders are numbered from 1.
    fn bind(&mut self, idx: usize, value: &ScalarValue) -> Result<()>;

    fn execute_query(&mut self) -> Result<Box<dyn RowCursor>>;

    /// Execute a write, returning the number of affected rows.
    fn execute_update(&mut self) -> Result<u64>;
}

pub trait RowCursor: Debug {
    /// Advance to the next row. Returns false once rows are exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Read a column of the current row. Columns are numbered from 1.
    ///
    /// `datatype` is the expected type when known.
    fn get(&mut self, idx: usize, datatype: Option<&DataType>) -> Result<ScalarValue>;
}

/// Owner of the objects created from query results.
pub trait Session {
    type Object: Clone;

    /// Get or create the object identified by the entity item.
    fn load_entity(&self, item: &EntityItem) -> Result<Self::Object>;

    /// Construct an object for `SELECT NEW`.
    fn construct(
        &self,
        type_name: &str,
        values: Vec<ResultValue<Self::Object>>,
    ) -> Result<Self::Object>;

    /// A write transaction is open. Cached results may not reflect its
    /// pending writes.
    fn in_write_transaction(&self) -> bool;
}
