use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use pathql_error::{QueryError, Result};
use tracing::debug;

use super::decode::RowDecoder;
use super::row::{CachedValue, ResultRow, ResultValue};
use super::{ExecutionBackend, PreparedStatement, Session};
use crate::cache::{CacheChunk, CacheKey, QueryCache};
use crate::expr::ParamRef;
use crate::query::CompiledQuery;
use crate::query::select::SelectBody;
use crate::value::ScalarValue;

/// A compiled query with bound arguments and a result window, executed
/// against a backend on behalf of a session.
///
/// SELECT results are served from the cache when every entity read by the
/// query has a cache timeout.
#[derive(Debug)]
pub struct UserQuery<'a, S: Session> {
    query: Arc<CompiledQuery>,
    backend: &'a dyn ExecutionBackend,
    session: &'a S,
    cache: Option<Arc<QueryCache>>,
    values: HashMap<ParamRef, ScalarValue>,
    first_result: u64,
    max_results: Option<u64>,
}

impl<'a, S: Session> UserQuery<'a, S> {
    pub fn new(
        query: Arc<CompiledQuery>,
        backend: &'a dyn ExecutionBackend,
        session: &'a S,
        cache: Option<Arc<QueryCache>>,
    ) -> Self {
        UserQuery {
            query,
            backend,
            session,
            cache,
            values: HashMap::new(),
            first_result: 0,
            max_results: None,
        }
    }

    pub fn query(&self) -> &CompiledQuery {
        &self.query
    }

    /// Bind a value to `?index`.
    pub fn set_parameter(
        &mut self,
        index: u32,
        value: impl Into<ScalarValue>,
    ) -> Result<&mut Self> {
        self.bind_value(ParamRef::Positional(index), value.into())?;
        Ok(self)
    }

    /// Bind a value to `:name`. The name is given without the colon.
    pub fn set_named_parameter(
        &mut self,
        name: &str,
        value: impl Into<ScalarValue>,
    ) -> Result<&mut Self> {
        self.bind_value(ParamRef::Named(name.to_string()), value.into())?;
        Ok(self)
    }

    fn bind_value(&mut self, param: ParamRef, value: ScalarValue) -> Result<()> {
        let info = self
            .query
            .parameter(&param)
            .ok_or_else(|| QueryError::bind(format!("Unknown parameter '{param}'")))?;

        if let (Some(expected), Some(actual)) = (&info.datatype, value.datatype()) {
            if !expected.is_comparable_with(&actual) {
                return Err(QueryError::bind(format!(
                    "Parameter '{param}' expects a value of type {expected}, got {actual}"
                )));
            }
        }

        self.values.insert(param, value);
        Ok(())
    }

    /// Skip the first `n` rows of the result.
    pub fn set_first_result(&mut self, n: u64) -> &mut Self {
        self.first_result = n;
        self
    }

    pub fn set_max_results(&mut self, n: u64) -> &mut Self {
        self.max_results = Some(n);
        self
    }

    /// Values for the SQL placeholders, in order.
    fn bound_values(&self) -> Result<Vec<ScalarValue>> {
        self.query
            .sql_arguments()
            .iter()
            .map(|param| {
                self.values
                    .get(param)
                    .cloned()
                    .ok_or_else(|| QueryError::bind(format!("Parameter '{param}' is not bound")))
            })
            .collect()
    }

    /// Offset and limit combining the statement's own clauses with the
    /// window set on this query.
    fn window(&self, body: &SelectBody) -> (u64, Option<u64>) {
        let offset = body.offset.unwrap_or(0) + self.first_result;
        let body_limit = body.limit.map(|l| l.saturating_sub(self.first_result));
        let limit = match (body_limit, self.max_results) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        (offset, limit)
    }

    #[tracing::instrument(skip(self), fields(source = %self.query.source()))]
    pub fn result_list(&self) -> Result<Vec<ResultRow<S::Object>>> {
        let body = self.query.select_body().ok_or_else(|| {
            QueryError::unsupported("Only SELECT statements return a result list")
        })?;
        let values = self.bound_values()?;
        let decoder = RowDecoder::new(body)?;
        let (offset, limit) = self.window(body);

        let rows = match self.cache_for(offset) {
            Some((cache, max_age)) => {
                self.cached_rows(cache, max_age, &decoder, values, offset, limit)?
            }
            None => self.fetch_rows(&decoder, &values, offset, limit)?,
        };

        rows.into_iter()
            .map(|row| self.materialize(body, row))
            .collect()
    }

    /// Execute and return the only row, if any.
    pub fn single_result(&self) -> Result<Option<ResultRow<S::Object>>> {
        let mut rows = self.result_list()?;
        if rows.len() > 1 {
            return Err(QueryError::new(format!(
                "Query returned {} rows where at most one was expected",
                rows.len()
            )));
        }
        Ok(rows.pop())
    }

    /// Execute an UPDATE or DELETE. Cached results reading the modified
    /// table are invalidated when any row was affected.
    #[tracing::instrument(skip(self), fields(source = %self.query.source()))]
    pub fn execute_update(&self) -> Result<u64> {
        let table = self.query.target_table().ok_or_else(|| {
            QueryError::unsupported("Only UPDATE and DELETE statements can be executed as updates")
        })?;
        let values = self.bound_values()?;

        let sql = self.query.sql();
        let mut stmt = self.prepare(sql, &values)?;
        let count = stmt
            .execute_update()
            .map_err(|e| e.with_field("sql", sql))?;
        debug!(count, %table, "executed update");

        if count > 0 {
            if let Some(cache) = &self.cache {
                cache.invalidate_table(table);
            }
        }

        Ok(count)
    }

    /// Cache to read through, with the maximum age of entries. None if the
    /// result may not be cached.
    fn cache_for(&self, offset: u64) -> Option<(&QueryCache, Duration)> {
        let cache = self.cache.as_deref()?;
        let config = cache.config();
        if !config.enabled || offset >= config.chunk_size as u64 {
            return None;
        }
        let max_age = self.query.cache_max_age()?;
        if self.session.in_write_transaction() && self.query.reads_writable_tables() {
            return None;
        }
        Some((cache, max_age))
    }

    fn cached_rows(
        &self,
        cache: &QueryCache,
        max_age: Duration,
        decoder: &RowDecoder,
        values: Vec<ScalarValue>,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Vec<CachedValue>>> {
        let key = CacheKey::new(self.query.sql(), values);

        let head = match cache.get(&key) {
            Some(head) => {
                debug!(%key, "cache hit");
                head
            }
            None => {
                debug!(%key, "cache miss");
                let max_rows = cache.config().max_cached_rows();
                let mut rows =
                    self.fetch_rows(decoder, key.values(), 0, Some(max_rows as u64 + 1))?;
                let complete = rows.len() <= max_rows;
                rows.truncate(max_rows);

                let chain = CacheChunk::build_chain(
                    rows,
                    cache.config().chunk_size,
                    Instant::now() + max_age,
                    self.query.tables(),
                    complete,
                );
                debug!(rows = chain.chain_len(), complete, "filled cache");
                cache.publish(key.clone(), chain)
            }
        };

        let take = limit.map_or(usize::MAX, |l| l as usize);
        let mut rows: Vec<_> = head
            .chain_rows()
            .skip(offset as usize)
            .take(take)
            .cloned()
            .collect();

        let wants_more = limit.is_none_or(|l| (rows.len() as u64) < l);
        if !head.is_complete() && wants_more {
            // Rows past the cached window come straight from the backend.
            let start = (head.chain_len() as u64).max(offset);
            let remaining = limit.map(|l| l - rows.len() as u64);
            debug!(start, "continuing past cached rows");
            rows.extend(self.fetch_rows(decoder, key.values(), start, remaining)?);
        }

        Ok(rows)
    }

    fn fetch_rows(
        &self,
        decoder: &RowDecoder,
        values: &[ScalarValue],
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Vec<CachedValue>>> {
        // Dialects without a limit clause skip and truncate here.
        let limited = self
            .query
            .dialect()
            .apply_limit(self.query.sql(), offset, limit);
        let (sql, mut skip) = match limited {
            Some(sql) => (sql, 0),
            None => (self.query.sql().to_string(), offset),
        };

        let mut stmt = self.prepare(&sql, values)?;
        let mut cursor = stmt
            .execute_query()
            .map_err(|e| e.with_field("sql", &sql))?;

        let mut rows = Vec::new();
        while limit.is_none_or(|l| (rows.len() as u64) < l) && cursor.next()? {
            if skip > 0 {
                skip -= 1;
                continue;
            }
            rows.push(decoder.decode(cursor.as_mut())?);
        }
        debug!(rows = rows.len(), offset, "fetched rows");

        Ok(rows)
    }

    fn prepare(&self, sql: &str, values: &[ScalarValue]) -> Result<Box<dyn PreparedStatement>> {
        let mut stmt = self
            .backend
            .prepare(sql)
            .map_err(|e| e.with_field("sql", sql))?;
        for (idx, value) in values.iter().enumerate() {
            stmt.bind(idx + 1, value)?;
        }
        Ok(stmt)
    }

    fn materialize(
        &self,
        body: &SelectBody,
        row: Vec<CachedValue>,
    ) -> Result<ResultRow<S::Object>> {
        let values = row
            .into_iter()
            .map(|value| match value {
                CachedValue::Scalar(v) => Ok(ResultValue::Scalar(v)),
                CachedValue::Entity(item) => {
                    Ok(ResultValue::Object(self.session.load_entity(&item)?))
                }
                CachedValue::Embedded(v) => Ok(ResultValue::Embedded(v)),
            })
            .collect::<Result<Vec<_>>>()?;

        match &body.constructor {
            Some(type_name) => {
                let object = self.session.construct(type_name, values)?;
                Ok(ResultRow::new(vec![ResultValue::Object(object)]))
            }
            None => Ok(ResultRow::new(values)),
        }
    }
}
