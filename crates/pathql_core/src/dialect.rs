use std::fmt::Write as _;

use pathql_error::{QueryError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitSyntax {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
    /// No limit clause, rows are skipped and truncated by the caller.
    None,
}

/// Capabilities and spelling of the target SQL dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    pub name: String,
    pub true_literal: String,
    pub false_literal: String,
    /// `UPDATE t a SET ...` is accepted.
    pub supports_update_table_alias: bool,
    /// `UPDATE t1 a, t2 b SET ...` is accepted.
    pub supports_update_table_list: bool,
    /// `a || b` concatenates strings.
    pub supports_concat_operator: bool,
    /// `POSITION(a IN b)` is preferred over `LOCATE(a, b)`.
    pub has_position_function: bool,
    pub limit_syntax: LimitSyntax,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::generic()
    }
}

impl Dialect {
    pub fn generic() -> Self {
        Dialect {
            name: "generic".to_string(),
            true_literal: "TRUE".to_string(),
            false_literal: "FALSE".to_string(),
            supports_update_table_alias: false,
            supports_update_table_list: false,
            supports_concat_operator: true,
            has_position_function: false,
            limit_syntax: LimitSyntax::LimitOffset,
        }
    }

    pub fn postgres() -> Self {
        Dialect {
            name: "postgres".to_string(),
            supports_update_table_alias: true,
            has_position_function: true,
            ..Self::generic()
        }
    }

    pub fn mysql() -> Self {
        Dialect {
            name: "mysql".to_string(),
            true_literal: "1".to_string(),
            false_literal: "0".to_string(),
            supports_update_table_alias: true,
            supports_update_table_list: true,
            supports_concat_operator: false,
            has_position_function: false,
            limit_syntax: LimitSyntax::LimitOffset,
        }
    }

    pub fn derby() -> Self {
        Dialect {
            name: "derby".to_string(),
            true_literal: "1".to_string(),
            false_literal: "0".to_string(),
            supports_update_table_alias: false,
            supports_update_table_list: false,
            supports_concat_operator: true,
            has_position_function: false,
            limit_syntax: LimitSyntax::OffsetFetch,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "generic" => Ok(Self::generic()),
            "postgres" | "postgresql" => Ok(Self::postgres()),
            "mysql" => Ok(Self::mysql()),
            "derby" => Ok(Self::derby()),
            other => Err(QueryError::config(format!("Unknown dialect: '{other}'"))),
        }
    }

    pub fn boolean_literal(&self, v: bool) -> &str {
        if v { &self.true_literal } else { &self.false_literal }
    }

    /// Append a limit clause to a SELECT. Returns None if the dialect cannot
    /// express limits and rows must be skipped by the caller.
    pub fn apply_limit(&self, sql: &str, offset: u64, limit: Option<u64>) -> Option<String> {
        if offset == 0 && limit.is_none() {
            return Some(sql.to_string());
        }

        let mut out = sql.to_string();
        match self.limit_syntax {
            LimitSyntax::LimitOffset => {
                if let Some(limit) = limit {
                    let _ = write!(out, " LIMIT {limit}");
                }
                if offset > 0 {
                    let _ = write!(out, " OFFSET {offset}");
                }
            }
            LimitSyntax::OffsetFetch => {
                if offset > 0 {
                    let _ = write!(out, " OFFSET {offset} ROWS");
                }
                if let Some(limit) = limit {
                    let _ = write!(out, " FETCH NEXT {limit} ROWS ONLY");
                }
            }
            LimitSyntax::None => return None,
        }
        Some(out)
    }
}
