use std::sync::Arc;

use pathql_error::Result;
use tracing::trace;

use crate::binder::bind_statement;
use crate::cache::QueryCache;
use crate::catalog::SchemaCatalog;
use crate::config::CompilerConfig;
use crate::execution::{ExecutionBackend, Session, UserQuery};
use crate::query::CompiledQuery;

/// Compiles query strings against a catalog and creates executable queries
/// sharing one result cache.
#[derive(Debug)]
pub struct QueryCompiler {
    catalog: Arc<dyn SchemaCatalog>,
    config: CompilerConfig,
    cache: Arc<QueryCache>,
}

impl QueryCompiler {
    pub fn new(catalog: Arc<dyn SchemaCatalog>) -> Self {
        Self::with_config(catalog, CompilerConfig::default())
    }

    pub fn with_config(catalog: Arc<dyn SchemaCatalog>, config: CompilerConfig) -> Self {
        let cache = Arc::new(QueryCache::new(config.cache.clone()));
        QueryCompiler {
            catalog,
            config,
            cache,
        }
    }

    /// Parse, bind and optimize a query, generating its SQL.
    #[tracing::instrument(skip(self))]
    pub fn compile(&self, query: &str) -> Result<Arc<CompiledQuery>> {
        let statement = pathql_parser::parse(query)?;
        trace!(?statement, "parsed statement");

        let mut compiled = bind_statement(
            self.catalog.as_ref(),
            query,
            &statement,
            &self.config.dialect,
        )?;
        compiled.init(self.config.enable_optimizer)?;

        Ok(Arc::new(compiled))
    }

    /// Compile a query and wrap it for execution on the backend.
    pub fn create_query<'a, S: Session>(
        &self,
        query: &str,
        backend: &'a dyn ExecutionBackend,
        session: &'a S,
    ) -> Result<UserQuery<'a, S>> {
        let compiled = self.compile(query)?;
        Ok(UserQuery::new(
            compiled,
            backend,
            session,
            Some(self.cache.clone()),
        ))
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn SchemaCatalog> {
        &self.catalog
    }
}
