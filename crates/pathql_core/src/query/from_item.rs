use std::fmt;
use std::sync::Arc;

use hashbrown::HashSet;
use pathql_error::{QueryError, Result};

use crate::catalog::{Discriminator, EntityType, Table};
use crate::expr::{Expr, JoinExpr, RenderContext, SqlBuffer};

/// Handle to a From-Item in the query's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FromItemId(pub usize);

impl fmt::Display for FromItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinSemantics {
    #[default]
    Unknown,
    /// Joined row must exist.
    Inner,
    /// Rendered as a LEFT JOIN.
    Outer,
}

/// One table occurrence in a query.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub id: FromItemId,
    /// SQL alias, unique within the statement.
    pub alias: String,
    /// Entity for items declared or navigated to. None for link and element
    /// collection tables.
    pub entity: Option<Arc<EntityType>>,
    pub table: Arc<Table>,
    pub join: Option<JoinExpr>,
    pub join_semantics: JoinSemantics,
    /// Removed by the optimizer.
    pub removed: bool,
}

impl FromItem {
    pub fn is_outer(&self) -> bool {
        self.join.is_some() && self.join_semantics == JoinSemantics::Outer
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.entity.as_ref().and_then(|e| e.discriminator.as_ref())
    }

    pub fn id_columns(&self) -> &[String] {
        self.table.id_columns()
    }

    pub fn is_id_column(&self, column: &str) -> bool {
        self.table.id_columns().iter().any(|c| c == column)
    }
}

/// Owner of every From-Item of a statement, including those of its
/// subqueries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FromArena {
    items: Vec<FromItem>,
    aliases: HashSet<String>,
}

impl FromArena {
    pub fn create(
        &mut self,
        alias: &str,
        entity: Option<Arc<EntityType>>,
        table: Arc<Table>,
    ) -> FromItemId {
        let id = FromItemId(self.items.len());
        let alias = self.unique_alias(alias);
        self.items.push(FromItem {
            id,
            alias,
            entity,
            table,
            join: None,
            join_semantics: JoinSemantics::Unknown,
            removed: false,
        });
        id
    }

    /// Reserve an alias not used by any other table reference in the
    /// statement.
    pub fn unique_alias(&mut self, base: &str) -> String {
        let base = sanitize_alias(base);
        if !is_sql_reserved(&base) && self.aliases.insert(base.to_lowercase()) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}{n}");
            if self.aliases.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn get(&self, id: FromItemId) -> &FromItem {
        &self.items[id.0]
    }

    pub fn get_mut(&mut self, id: FromItemId) -> &mut FromItem {
        &mut self.items[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FromItem> {
        self.items.iter()
    }

    /// Items not removed by the optimizer.
    pub fn live(&self) -> impl Iterator<Item = &FromItem> {
        self.items.iter().filter(|item| !item.removed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Some live item is joined with `id` as its parent.
    pub fn is_join_parent(&self, id: FromItemId) -> bool {
        self.live()
            .filter(|item| item.id != id)
            .any(|item| item.join.as_ref().is_some_and(|j| j.parent == id))
    }
}

fn sanitize_alias(base: &str) -> String {
    let s: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    match s.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => s,
        Some(_) => format!("t{s}"),
        None => "t".to_string(),
    }
}

/// Words the supported dialects reject as a bare table alias. Sorted.
const SQL_RESERVED: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "both", "by", "case", "cast", "check",
    "collate", "column", "constraint", "create", "cross", "current_date", "current_time",
    "current_timestamp", "current_user", "default", "delete", "desc", "distinct", "do",
    "else", "end", "except", "exists", "false", "fetch", "for", "foreign", "from", "full",
    "grant", "group", "having", "in", "index", "inner", "insert", "intersect", "into", "is",
    "join", "key", "leading", "left", "like", "limit", "natural", "not", "null", "offset",
    "on", "or", "order", "outer", "primary", "references", "right", "select",
    "session_user", "set", "some", "table", "then", "to", "trailing", "true", "union",
    "unique", "update", "user", "using", "values", "when", "where", "with",
];

fn is_sql_reserved(alias: &str) -> bool {
    SQL_RESERVED
        .binary_search(&alias.to_ascii_lowercase().as_str())
        .is_ok()
}

/// Render the table references of a FROM clause. Outer joined items follow
/// the item they are joined to.
pub fn render_from_clause(
    buf: &mut SqlBuffer,
    ctx: &RenderContext,
    items: &[FromItemId],
) -> Result<()> {
    let mut emitted = 0;
    let mut first = true;
    for &id in items {
        let item = ctx.arena.get(id);
        if item.is_outer() {
            continue;
        }
        if !first {
            buf.push_str(", ");
        }
        first = false;
        write_table(buf, item);
        emitted += 1;
        emitted += render_outer_joins(buf, ctx, items, id)?;
    }

    if emitted != items.len() {
        let missing: Vec<_> = items
            .iter()
            .map(|id| ctx.arena.get(*id))
            .filter(|item| item.is_outer())
            .map(|item| item.alias.clone())
            .collect();
        return Err(QueryError::new(format!(
            "Outer joined items without a parent in the FROM clause: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

fn render_outer_joins(
    buf: &mut SqlBuffer,
    ctx: &RenderContext,
    items: &[FromItemId],
    parent: FromItemId,
) -> Result<usize> {
    let mut emitted = 0;
    for &id in items {
        let item = ctx.arena.get(id);
        let join = match &item.join {
            Some(join) if item.is_outer() && join.parent == parent => join,
            _ => continue,
        };

        buf.push_str(" LEFT JOIN ");
        write_table(buf, item);
        buf.push_str(" ON ");
        join.render(buf, ctx)?;
        if let Some(disc) = item.discriminator() {
            buf.push_str(" AND ");
            write_discriminator(buf, ctx, id, disc)?;
        }
        emitted += 1;
        emitted += render_outer_joins(buf, ctx, items, id)?;
    }
    Ok(emitted)
}

fn write_table(buf: &mut SqlBuffer, item: &FromItem) {
    buf.push_str(&item.table.name);
    buf.push_str(" ");
    buf.push_str(&item.alias);
}

fn write_discriminator(
    buf: &mut SqlBuffer,
    ctx: &RenderContext,
    id: FromItemId,
    disc: &Discriminator,
) -> Result<()> {
    ctx.write_column(buf, id, &disc.column)?;
    buf.push_str(" = ");
    buf.push_str(&crate::expr::render::quote_string(&disc.value));
    Ok(())
}

/// Render the conjunction of the predicate, the join conditions of inner
/// joined items and discriminator guards. Writes `prefix` first if there is
/// anything to render.
pub fn render_conditions(
    buf: &mut SqlBuffer,
    ctx: &RenderContext,
    items: &[FromItemId],
    predicate: Option<&Expr>,
    prefix: &str,
) -> Result<bool> {
    let mut first = true;
    let mut sep = |buf: &mut SqlBuffer| {
        if first {
            buf.push_str(prefix);
            first = false;
        } else {
            buf.push_str(" AND ");
        }
    };

    if let Some(predicate) = predicate {
        match predicate {
            Expr::And(children) => {
                for child in children {
                    sep(buf);
                    child.render(buf, ctx)?;
                }
            }
            other => {
                sep(buf);
                other.render(buf, ctx)?;
            }
        }
    }

    for &id in items {
        let item = ctx.arena.get(id);
        if item.is_outer() {
            continue;
        }
        if let Some(join) = &item.join {
            sep(buf);
            join.render(buf, ctx)?;
        }
    }

    for &id in items {
        let item = ctx.arena.get(id);
        if item.is_outer() {
            continue;
        }
        if let Some(disc) = item.discriminator() {
            sep(buf);
            write_discriminator(buf, ctx, id, disc)?;
        }
    }

    Ok(!first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::dialect::Dialect;
    use crate::expr::{JoinColumn, JoinKind};
    use crate::value::DataType;

    fn table(name: &str) -> Arc<Table> {
        Arc::new(Table {
            name: name.to_string(),
            columns: vec![Column::new("id", DataType::Int64)],
            id_columns: vec!["id".to_string()],
            outgoing_links: Vec::new(),
        })
    }

    fn join(kind: JoinKind, parent: FromItemId, target: FromItemId, p: &str, t: &str) -> JoinExpr {
        JoinExpr {
            kind,
            parent,
            target,
            columns: vec![JoinColumn {
                parent: p.to_string(),
                target: t.to_string(),
            }],
        }
    }

    #[test]
    fn unique_aliases() {
        let mut arena = FromArena::default();
        let a = arena.create("items", None, table("order_items"));
        let b = arena.create("Items", None, table("order_items"));
        let c = arena.create("1x", None, table("order_items"));
        assert_eq!("items", arena.get(a).alias);
        assert_eq!("Items1", arena.get(b).alias);
        assert_eq!("t1x", arena.get(c).alias);
    }

    #[test]
    fn reserved_words_are_not_aliases() {
        let mut arena = FromArena::default();
        let a = arena.create("order", None, table("orders"));
        let b = arena.create("Order", None, table("orders"));
        let c = arena.create("user", None, table("users"));
        let d = arena.create("orders", None, table("orders"));
        assert_eq!("order1", arena.get(a).alias);
        assert_eq!("Order2", arena.get(b).alias);
        assert_eq!("user1", arena.get(c).alias);
        assert_eq!("orders", arena.get(d).alias);
    }

    #[test]
    fn outer_joins_follow_parent() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let x = arena.create("x", None, table("products"));
        let c = arena.create("customer", None, table("customers"));
        let a = arena.create("country", None, table("countries"));

        let item = arena.get_mut(c);
        item.join = Some(join(JoinKind::ManyToOne, o, c, "customer_id", "id"));
        item.join_semantics = JoinSemantics::Outer;
        let item = arena.get_mut(a);
        item.join = Some(join(JoinKind::ManyToOne, c, a, "country_id", "id"));
        item.join_semantics = JoinSemantics::Outer;

        let dialect = Dialect::generic();
        let ctx = RenderContext::new(&arena, &dialect);

        // Outer items listed before their parents still render after them.
        let mut buf = SqlBuffer::new();
        render_from_clause(&mut buf, &ctx, &[a, o, c, x]).unwrap();
        assert_eq!(
            "orders o LEFT JOIN customers customer ON o.customer_id = customer.id \
             LEFT JOIN countries country ON customer.country_id = country.id, products x",
            buf.sql()
        );

        let mut buf = SqlBuffer::new();
        let wrote = render_conditions(&mut buf, &ctx, &[o, c, a, x], None, " WHERE ").unwrap();
        assert!(!wrote);
        assert_eq!("", buf.sql());
    }

    #[test]
    fn missing_outer_parent() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let c = arena.create("c", None, table("customers"));
        let item = arena.get_mut(c);
        item.join = Some(join(JoinKind::ManyToOne, o, c, "customer_id", "id"));
        item.join_semantics = JoinSemantics::Outer;

        let dialect = Dialect::generic();
        let ctx = RenderContext::new(&arena, &dialect);
        let mut buf = SqlBuffer::new();
        assert!(render_from_clause(&mut buf, &ctx, &[c]).is_err());
    }

    #[test]
    fn inner_join_conditions() {
        let mut arena = FromArena::default();
        let o = arena.create("o", None, table("orders"));
        let c = arena.create("c", None, table("customers"));
        let item = arena.get_mut(c);
        item.join = Some(join(JoinKind::ManyToOne, o, c, "customer_id", "id"));
        item.join_semantics = JoinSemantics::Inner;

        let dialect = Dialect::generic();
        let ctx = RenderContext::new(&arena, &dialect);
        let mut buf = SqlBuffer::new();
        render_from_clause(&mut buf, &ctx, &[o, c]).unwrap();
        render_conditions(&mut buf, &ctx, &[o, c], None, " WHERE ").unwrap();
        assert_eq!("orders o, customers c WHERE o.customer_id = c.id", buf.sql());
    }
}
