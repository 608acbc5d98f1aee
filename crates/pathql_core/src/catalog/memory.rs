use std::sync::Arc;
use std::time::Duration;

use pathql_error::{QueryError, Result, ResultExt};
use scc::HashIndex;
use scc::ebr::Guard;
use serde::{Deserialize, Serialize};

use super::{
    Discriminator, EmbeddedColumn, EntityType, EnumConstant, EnumDefinition, Field, FieldKind,
    LinkColumns, SchemaCatalog, Table,
};

/// Serializable description of a whole schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub discriminator: Option<Discriminator>,
    #[serde(default)]
    pub cache_timeout_ms: Option<u64>,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldDefinitionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedColumnDefinition {
    pub field: String,
    pub column: String,
}

/// Field mappings by column and link name. Links are looked up in the
/// `outgoing_links` of the table holding the foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDefinitionKind {
    Id {
        column: String,
    },
    KeyProperty {
        column: String,
    },
    Basic {
        column: String,
    },
    Embedded {
        type_name: String,
        columns: Vec<EmbeddedColumnDefinition>,
    },
    ManyToOne {
        target: String,
        #[serde(default)]
        link: Option<String>,
        #[serde(default)]
        key: bool,
    },
    OneToMany {
        target: String,
        #[serde(default)]
        link: Option<String>,
    },
    ManyToMany {
        target: String,
        link_table: String,
    },
    DependentOneToOne {
        target: String,
        #[serde(default)]
        link: Option<String>,
    },
    ElementCollection {
        table: String,
        column: String,
    },
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: HashIndex<String, Arc<Table>>,
    entities: HashIndex<String, Arc<EntityType>>,
    enums: HashIndex<String, Arc<EnumDefinition>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let def: SchemaDefinition =
            serde_json::from_str(json).context("Failed to parse schema definition")?;
        Self::from_definition(def)
    }

    /// Build a catalog from a definition. Entities may reference each other in
    /// any order.
    pub fn from_definition(def: SchemaDefinition) -> Result<Self> {
        let catalog = Self::new();
        for table in def.tables {
            catalog.create_table(table)?;
        }
        for enum_def in def.enums {
            catalog.create_enum(enum_def)?;
        }

        let entity_tables: Vec<(String, String)> = def
            .entities
            .iter()
            .map(|e| (e.name.clone(), e.table.clone()))
            .collect();
        let lookup = |name: &str| {
            entity_tables
                .iter()
                .find(|(entity, _)| entity == name)
                .map(|(_, table)| table.clone())
        };

        for entity in def.entities {
            let resolved = catalog.resolve_definition(entity, &lookup)?;
            catalog.insert_entity(resolved)?;
        }

        Ok(catalog)
    }

    pub fn create_table(&self, table: Table) -> Result<Arc<Table>> {
        for id in &table.id_columns {
            if table.column(id).is_none() {
                return Err(QueryError::config(format!(
                    "Id column '{id}' not found in table '{}'",
                    table.name
                )));
            }
        }

        use scc::hash_index::Entry;

        let table = Arc::new(table);
        match self.tables.entry(table.name.clone()) {
            Entry::Vacant(ent) => {
                ent.insert_entry(table.clone());
                Ok(table)
            }
            Entry::Occupied(_) => Err(QueryError::config(format!(
                "Duplicate table name: '{}'",
                table.name
            ))),
        }
    }

    pub fn create_enum(&self, def: EnumDefinition) -> Result<()> {
        use scc::hash_index::Entry;

        match self.enums.entry(def.type_name.clone()) {
            Entry::Vacant(ent) => {
                ent.insert_entry(Arc::new(def));
                Ok(())
            }
            Entry::Occupied(_) => Err(QueryError::config(format!(
                "Duplicate enum type: '{}'",
                def.type_name
            ))),
        }
    }

    /// Create a single entity. Relationship targets must already exist, or be
    /// the entity itself.
    pub fn create_entity(&self, def: EntityDefinition) -> Result<Arc<EntityType>> {
        let own = (def.name.clone(), def.table.clone());
        let lookup = |name: &str| {
            if name == own.0 {
                return Some(own.1.clone());
            }
            self.resolve_entity(name).map(|e| e.table.name.clone())
        };
        let resolved = self.resolve_definition(def, &lookup)?;
        self.insert_entity(resolved)
    }

    fn insert_entity(&self, entity: EntityType) -> Result<Arc<EntityType>> {
        use scc::hash_index::Entry;

        let entity = Arc::new(entity);
        match self.entities.entry(entity.name.clone()) {
            Entry::Vacant(ent) => {
                ent.insert_entry(entity.clone());
                Ok(entity)
            }
            Entry::Occupied(_) => Err(QueryError::config(format!(
                "Duplicate entity name: '{}'",
                entity.name
            ))),
        }
    }

    fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.resolve_table(name)
            .ok_or_else(|| QueryError::config(format!("Missing table '{name}'")))
    }

    fn resolve_definition(
        &self,
        def: EntityDefinition,
        entity_table: &dyn Fn(&str) -> Option<String>,
    ) -> Result<EntityType> {
        let table = self.table(&def.table)?;

        let target_table = |target: &str| {
            entity_table(target).ok_or_else(|| {
                QueryError::config(format!(
                    "Entity '{}' references unknown entity '{target}'",
                    def.name
                ))
            })
        };

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let kind = match &field.kind {
                FieldDefinitionKind::Id { column } => FieldKind::Id {
                    column: find_column(&table, column)?,
                },
                FieldDefinitionKind::KeyProperty { column } => FieldKind::KeyProperty {
                    column: find_column(&table, column)?,
                },
                FieldDefinitionKind::Basic { column } => FieldKind::Basic {
                    column: find_column(&table, column)?,
                },
                FieldDefinitionKind::Embedded { type_name, columns } => FieldKind::Embedded {
                    type_name: type_name.clone(),
                    columns: columns
                        .iter()
                        .map(|c| {
                            Ok(EmbeddedColumn {
                                field: c.field.clone(),
                                column: find_column(&table, &c.column)?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                },
                FieldDefinitionKind::ManyToOne { target, link, key } => {
                    let target_name = target_table(target)?;
                    FieldKind::ManyToOne {
                        target: target.clone(),
                        link: find_link(&table, &target_name, link.as_deref())?,
                        key: *key,
                    }
                }
                FieldDefinitionKind::OneToMany { target, link } => {
                    let child = self.table(&target_table(target)?)?;
                    FieldKind::OneToMany {
                        target: target.clone(),
                        link: find_link(&child, &table.name, link.as_deref())?,
                    }
                }
                FieldDefinitionKind::DependentOneToOne { target, link } => {
                    let child = self.table(&target_table(target)?)?;
                    FieldKind::DependentOneToOne {
                        target: target.clone(),
                        link: find_link(&child, &table.name, link.as_deref())?,
                    }
                }
                FieldDefinitionKind::ManyToMany { target, link_table } => {
                    let target_name = target_table(target)?;
                    let link_table = self.table(link_table)?;
                    let source_link = find_link(&link_table, &table.name, None)?;
                    let target_link = find_link(&link_table, &target_name, None)?;
                    FieldKind::ManyToMany {
                        target: target.clone(),
                        link_table,
                        source_link,
                        target_link,
                    }
                }
                FieldDefinitionKind::ElementCollection {
                    table: coll_table,
                    column,
                } => {
                    let coll_table = self.table(coll_table)?;
                    let link = find_link(&coll_table, &table.name, None)?;
                    let column = find_column(&coll_table, column)?;
                    FieldKind::ElementCollection {
                        table: coll_table,
                        link,
                        column,
                    }
                }
            };
            fields.push(Field {
                name: field.name.clone(),
                kind,
            });
        }

        if let Some(disc) = &def.discriminator {
            find_column(&table, &disc.column)?;
        }

        Ok(EntityType {
            name: def.name,
            table,
            fields,
            discriminator: def.discriminator,
            cache_timeout: def.cache_timeout_ms.map(Duration::from_millis),
            read_only: def.read_only,
        })
    }

    /// Names of all registered entities, sorted.
    pub fn entity_names(&self) -> Vec<String> {
        let guard = Guard::new();
        let mut names: Vec<_> = self.entities.iter(&guard).map(|(k, _)| k.clone()).collect();
        names.sort();
        names
    }
}

fn find_column(table: &Table, name: &str) -> Result<super::Column> {
    table.column(name).cloned().ok_or_else(|| {
        QueryError::config(format!("Column '{name}' not found in table '{}'", table.name))
    })
}

fn find_link(table: &Table, target: &str, name: Option<&str>) -> Result<LinkColumns> {
    let mut links = table.links_to(target, name);
    let link = links.next().ok_or_else(|| {
        QueryError::config(format!(
            "No link from table '{}' to table '{target}'",
            table.name
        ))
    })?;
    if links.next().is_some() {
        return Err(QueryError::config(format!(
            "Ambiguous links from table '{}' to table '{target}', name the link to use",
            table.name
        )));
    }
    Ok(link.clone())
}

impl SchemaCatalog for MemoryCatalog {
    fn resolve_entity(&self, name: &str) -> Option<Arc<EntityType>> {
        let guard = Guard::new();
        self.entities.peek(name, &guard).cloned()
    }

    fn resolve_table(&self, name: &str) -> Option<Arc<Table>> {
        let guard = Guard::new();
        self.tables.peek(name, &guard).cloned()
    }

    fn resolve_enum(&self, type_name: &str, constant: &str) -> Option<EnumConstant> {
        let guard = Guard::new();
        let (_, def) = self
            .enums
            .iter(&guard)
            .find(|(_, def)| def.matches_name(type_name))?;
        let ordinal = def.constants.iter().position(|c| c == constant)?;
        Some(EnumConstant {
            type_name: def.type_name.clone(),
            name: constant.to_string(),
            ordinal,
        })
    }
}

#[cfg(test)]
mod tests {
    use pathql_error::ErrorKind;

    use super::*;
    use crate::catalog::{Column, ColumnPair};
    use crate::value::DataType;

    fn table(name: &str, cols: &[&str], links: Vec<LinkColumns>) -> Table {
        Table {
            name: name.to_string(),
            columns: cols.iter().map(|c| Column::new(*c, DataType::Int64)).collect(),
            id_columns: vec!["id".to_string()],
            outgoing_links: links,
        }
    }

    fn link(name: &str, target: &str, source_col: &str) -> LinkColumns {
        LinkColumns {
            name: name.to_string(),
            target_table: target.to_string(),
            columns: vec![ColumnPair {
                source: source_col.to_string(),
                target: "id".to_string(),
            }],
        }
    }

    #[test]
    fn resolve_many_to_one_defined_later() {
        let def = SchemaDefinition {
            tables: vec![
                table(
                    "orders",
                    &["id", "customer_id"],
                    vec![link("fk_customer", "customers", "customer_id")],
                ),
                table("customers", &["id"], vec![]),
            ],
            entities: vec![
                EntityDefinition {
                    name: "Order".to_string(),
                    table: "orders".to_string(),
                    fields: vec![FieldDefinition {
                        name: "customer".to_string(),
                        kind: FieldDefinitionKind::ManyToOne {
                            target: "Customer".to_string(),
                            link: None,
                            key: false,
                        },
                    }],
                    discriminator: None,
                    cache_timeout_ms: Some(500),
                    read_only: false,
                },
                EntityDefinition {
                    name: "Customer".to_string(),
                    table: "customers".to_string(),
                    fields: vec![],
                    discriminator: None,
                    cache_timeout_ms: None,
                    read_only: false,
                },
            ],
            enums: vec![],
        };

        let catalog = MemoryCatalog::from_definition(def).unwrap();
        let order = catalog.resolve_entity("Order").unwrap();
        match &order.field("customer").unwrap().kind {
            FieldKind::ManyToOne { link, .. } => assert_eq!("customer_id", link.columns[0].source),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(Some(Duration::from_millis(500)), order.cache_timeout);
        assert_eq!(vec!["Customer", "Order"], catalog.entity_names());
    }

    #[test]
    fn ambiguous_link_requires_name() {
        let catalog = MemoryCatalog::new();
        catalog
            .create_table(table(
                "orders",
                &["id", "billing_id", "shipping_id"],
                vec![
                    link("fk_billing", "addresses", "billing_id"),
                    link("fk_shipping", "addresses", "shipping_id"),
                ],
            ))
            .unwrap();
        catalog.create_table(table("addresses", &["id"], vec![])).unwrap();
        catalog
            .create_entity(EntityDefinition {
                name: "Address".to_string(),
                table: "addresses".to_string(),
                fields: vec![],
                discriminator: None,
                cache_timeout_ms: None,
                read_only: false,
            })
            .unwrap();

        let mut def = EntityDefinition {
            name: "Order".to_string(),
            table: "orders".to_string(),
            fields: vec![FieldDefinition {
                name: "billing".to_string(),
                kind: FieldDefinitionKind::ManyToOne {
                    target: "Address".to_string(),
                    link: None,
                    key: false,
                },
            }],
            discriminator: None,
            cache_timeout_ms: None,
            read_only: false,
        };

        let err = catalog.create_entity(def.clone()).unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());

        def.fields[0].kind = FieldDefinitionKind::ManyToOne {
            target: "Address".to_string(),
            link: Some("fk_billing".to_string()),
            key: false,
        };
        let order = catalog.create_entity(def).unwrap();
        assert_eq!(2, order.load_columns().len());
    }

    #[test]
    fn resolve_enum_by_simple_name() {
        let catalog = MemoryCatalog::new();
        catalog
            .create_enum(EnumDefinition {
                type_name: "com.acme.Status".to_string(),
                constants: vec!["NEW".to_string(), "SHIPPED".to_string()],
            })
            .unwrap();

        let constant = catalog.resolve_enum("Status", "SHIPPED").unwrap();
        assert_eq!(1, constant.ordinal);
        assert_eq!("com.acme.Status", constant.type_name);
        assert!(catalog.resolve_enum("com.acme.Status", "LOST").is_none());
        assert!(catalog.resolve_enum("Other", "NEW").is_none());
    }

    #[test]
    fn from_json() {
        let json = r#"{
            "tables": [
                {"name": "countries", "columns": [{"name": "code", "datatype": "utf8"}], "id_columns": ["code"]}
            ],
            "entities": [
                {"name": "Country", "table": "countries", "read_only": true, "cache_timeout_ms": 60000,
                 "fields": [{"name": "code", "kind": {"id": {"column": "code"}}}]}
            ]
        }"#;

        let catalog = MemoryCatalog::from_json(json).unwrap();
        let country = catalog.resolve_entity("Country").unwrap();
        assert!(country.read_only);
        assert_eq!(&["code".to_string()], country.id_columns());
    }
}
