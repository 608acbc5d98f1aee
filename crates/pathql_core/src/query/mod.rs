//! Bound statements and the compiled query that owns them.

pub mod delete;
pub mod from_item;
pub mod select;
pub mod update;

use std::sync::Arc;
use std::time::Duration;

use pathql_error::Result;
use tracing::debug;

use self::delete::DeleteBody;
use self::from_item::{FromArena, FromItemId};
use self::select::SelectBody;
use self::update::UpdateBody;
use crate::catalog::{EntityType, Table};
use crate::dialect::Dialect;
use crate::expr::{CollectionKind, Expr, ParamRef, RenderContext, SqlBuffer, UsesMode};
use crate::optimizer;
use crate::value::DataType;

/// Access to the parts of a statement body shared by the optimizer.
pub trait QueryBody {
    /// Items of this body in declaration order. Items of subqueries are not
    /// included.
    fn from_list(&self) -> &[FromItemId];

    fn from_list_mut(&mut self) -> &mut Vec<FromItemId>;

    /// WHERE, and HAVING for selects.
    fn predicates_mut(&mut self) -> Vec<&mut Option<Expr>>;

    fn filters(&self) -> Vec<&Expr>;

    /// Every expression of the body.
    fn exprs(&self) -> Vec<&Expr>;

    fn exprs_mut(&mut self) -> Vec<&mut Expr>;

    fn uses(&self, item: FromItemId, mode: UsesMode) -> bool {
        match mode {
            UsesMode::InnerJoin => self.filters().into_iter().any(|e| e.uses(item, mode)),
            _ => self.exprs().into_iter().any(|e| e.uses(item, mode)),
        }
    }

    /// Check if any filter proves the item's row exists.
    fn exists(&self, item: FromItemId) -> bool {
        self.filters().into_iter().any(|e| e.exists(item))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundStatement {
    Select(SelectBody),
    Update(UpdateBody),
    Delete(DeleteBody),
}

impl BoundStatement {
    pub fn body(&self) -> &dyn QueryBody {
        match self {
            Self::Select(body) => body,
            Self::Update(body) => body,
            Self::Delete(body) => body,
        }
    }

    pub fn body_mut(&mut self) -> &mut dyn QueryBody {
        match self {
            Self::Select(body) => body,
            Self::Update(body) => body,
            Self::Delete(body) => body,
        }
    }
}

/// A parameter referenced by the query, with the type inferred from its
/// usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    pub param: ParamRef,
    pub datatype: Option<DataType>,
}

/// A bound, optimized query ready for execution.
///
/// The SQL text is generated once by `init` and does not change after.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    source: String,
    arena: FromArena,
    statement: BoundStatement,
    parameters: Vec<ParameterInfo>,
    fetch_hints: Vec<String>,
    dialect: Dialect,
    sql: String,
    /// Parameter bound to each placeholder in `sql`, in order.
    sql_arguments: Vec<ParamRef>,
    has_subquery: bool,
    cache_max_age: Option<Duration>,
    tables: Vec<String>,
    reads_writable: bool,
    initialized: bool,
}

/// A table read or written by the generated SQL, with the entity it stores.
struct TableSource {
    table: Arc<Table>,
    entity: Option<Arc<EntityType>>,
}

impl CompiledQuery {
    pub fn new(
        source: impl Into<String>,
        arena: FromArena,
        statement: BoundStatement,
        parameters: Vec<ParameterInfo>,
        fetch_hints: Vec<String>,
        dialect: Dialect,
    ) -> Self {
        CompiledQuery {
            source: source.into(),
            arena,
            statement,
            parameters,
            fetch_hints,
            dialect,
            sql: String::new(),
            sql_arguments: Vec::new(),
            has_subquery: false,
            cache_max_age: None,
            tables: Vec::new(),
            reads_writable: false,
            initialized: false,
        }
    }

    /// Optimize the statement and generate its SQL. Calling this again is a
    /// no-op.
    pub fn init(&mut self, enable_optimizer: bool) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        optimizer::optimize(&mut self.arena, &mut self.statement, enable_optimizer)?;

        let (sql, sql_arguments) = self.render(true)?;
        self.sql = sql;
        self.sql_arguments = sql_arguments;
        self.has_subquery = self
            .statement
            .body()
            .exprs()
            .into_iter()
            .any(|e| e.has_subquery());
        let sources = self.sources();
        self.cache_max_age = compute_cache_max_age(&sources);
        self.tables = compute_tables(&sources);
        self.reads_writable = sources
            .iter()
            .any(|s| s.entity.as_ref().is_none_or(|e| !e.read_only));
        self.initialized = true;

        debug!(source = %self.source, sql = %self.sql, "compiled query");
        Ok(())
    }

    /// Render the statement. For selects, `full` controls whether entity
    /// loads read every column or only the identifier.
    pub fn generate_load_sql(&self, full: bool) -> Result<(String, Vec<ParamRef>)> {
        self.render(full)
    }

    fn render(&self, full: bool) -> Result<(String, Vec<ParamRef>)> {
        let ctx = RenderContext::new(&self.arena, &self.dialect).with_full_load(full);
        let mut buf = SqlBuffer::new();
        match &self.statement {
            BoundStatement::Select(body) => body.render(&mut buf, &ctx)?,
            BoundStatement::Update(body) => body.render(&mut buf, &ctx)?,
            BoundStatement::Delete(body) => body.render(&mut buf, &ctx)?,
        }
        Ok(buf.into_parts())
    }

    /// Live items, plus the collection tables read by MEMBER OF and IS EMPTY
    /// checks at any level of the query.
    fn sources(&self) -> Vec<TableSource> {
        let mut sources: Vec<TableSource> = self
            .arena
            .live()
            .map(|item| TableSource {
                table: item.table.clone(),
                entity: item.entity.clone(),
            })
            .collect();

        for expr in self.statement.body().exprs() {
            expr.any(&mut |e| {
                if let Expr::MemberOf(pred) | Expr::Empty(pred) = e {
                    let path = &pred.collection.path;
                    let entity = match path.kind {
                        CollectionKind::OneToMany => path.target.clone(),
                        CollectionKind::ManyToMany | CollectionKind::Element => None,
                    };
                    sources.push(TableSource {
                        table: path.table.clone(),
                        entity,
                    });
                }
                false
            });
        }

        sources
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn sql_arguments(&self) -> &[ParamRef] {
        &self.sql_arguments
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn parameter(&self, param: &ParamRef) -> Option<&ParameterInfo> {
        self.parameters.iter().find(|p| &p.param == param)
    }

    pub fn fetch_hints(&self) -> &[String] {
        &self.fetch_hints
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn arena(&self) -> &FromArena {
        &self.arena
    }

    pub fn statement(&self) -> &BoundStatement {
        &self.statement
    }

    pub fn select_body(&self) -> Option<&SelectBody> {
        match &self.statement {
            BoundStatement::Select(body) => Some(body),
            _ => None,
        }
    }

    pub fn has_subquery(&self) -> bool {
        self.has_subquery
    }

    /// Shortest cache timeout among the entities read by this query. None if
    /// any of them may not be cached.
    pub fn cache_max_age(&self) -> Option<Duration> {
        self.cache_max_age
    }

    /// Tables read or written, sorted.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Table modified by an UPDATE or DELETE.
    pub fn target_table(&self) -> Option<&str> {
        let target = match &self.statement {
            BoundStatement::Select(_) => return None,
            BoundStatement::Update(body) => body.target,
            BoundStatement::Delete(body) => body.target,
        };
        Some(&self.arena.get(target).table.name)
    }

    /// Some table read by the query belongs to an entity that can be
    /// written.
    pub fn reads_writable_tables(&self) -> bool {
        self.reads_writable
    }

    /// Number of live items in the top level FROM clause.
    pub fn from_count(&self) -> usize {
        self.statement.body().from_list().len()
    }
}

fn compute_cache_max_age(sources: &[TableSource]) -> Option<Duration> {
    let mut max_age: Option<Duration> = None;
    for source in sources {
        let entity = match &source.entity {
            Some(entity) => entity,
            None => continue,
        };
        let timeout = entity.cache_timeout?;
        max_age = Some(match max_age {
            Some(current) => current.min(timeout),
            None => timeout,
        });
    }
    max_age.filter(|age| !age.is_zero())
}

fn compute_tables(sources: &[TableSource]) -> Vec<String> {
    let mut tables: Vec<String> = sources.iter().map(|s| s.table.name.clone()).collect();
    tables.sort();
    tables.dedup();
    tables
}
