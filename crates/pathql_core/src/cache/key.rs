use std::fmt;

use crate::value::ScalarValue;

/// Identifies a cached result: the generated SQL and the values bound to its
/// placeholders, in order. NULLs compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    sql: String,
    values: Vec<ScalarValue>,
    parameter_count: usize,
}

impl CacheKey {
    pub fn new(sql: impl Into<String>, values: Vec<ScalarValue>) -> Self {
        let parameter_count = values.len();
        CacheKey {
            sql: sql.into(),
            values,
            parameter_count,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.sql)?;
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}
