use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Column {
            name: name.into(),
            datatype,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPair {
    /// Column on the table owning the link.
    pub source: String,
    /// Referenced column on the target table.
    pub target: String,
}

/// Foreign key columns from the owning table to a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkColumns {
    pub name: String,
    pub target_table: String,
    pub columns: Vec<ColumnPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub id_columns: Vec<String>,
    #[serde(default)]
    pub outgoing_links: Vec<LinkColumns>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn id_columns(&self) -> &[String] {
        &self.id_columns
    }

    /// Find links from this table to `target`, optionally restricted to a
    /// link name.
    pub fn links_to<'a>(
        &'a self,
        target: &'a str,
        name: Option<&'a str>,
    ) -> impl Iterator<Item = &'a LinkColumns> + 'a {
        self.outgoing_links.iter().filter(move |link| {
            link.target_table == target && name.map(|n| n == link.name).unwrap_or(true)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminator {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedColumn {
    pub field: String,
    pub column: Column,
}

/// A field of an entity with its mapping fully resolved against the tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Id {
        column: Column,
    },
    /// One part of a composite key.
    KeyProperty {
        column: Column,
    },
    Basic {
        column: Column,
    },
    Embedded {
        type_name: String,
        columns: Vec<EmbeddedColumn>,
    },
    /// `link` runs from this entity's table to the target's table. `key` is
    /// set when the foreign key is part of the identifier.
    ManyToOne {
        target: String,
        link: LinkColumns,
        key: bool,
    },
    /// `link` runs from the target's table back to this entity's table.
    OneToMany {
        target: String,
        link: LinkColumns,
    },
    ManyToMany {
        target: String,
        link_table: Arc<Table>,
        /// Link table to this entity's table.
        source_link: LinkColumns,
        /// Link table to the target's table.
        target_link: LinkColumns,
    },
    /// One-to-one owned by the target side; `link` runs from the target's
    /// table back to this entity's table.
    DependentOneToOne {
        target: String,
        link: LinkColumns,
    },
    ElementCollection {
        table: Arc<Table>,
        /// Collection table to this entity's table.
        link: LinkColumns,
        column: Column,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub table: Arc<Table>,
    pub fields: Vec<Field>,
    pub discriminator: Option<Discriminator>,
    /// Maximum age of cached results. None means results are never cached.
    pub cache_timeout: Option<Duration>,
    pub read_only: bool,
}

impl EntityType {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn id_columns(&self) -> &[String] {
        self.table.id_columns()
    }

    /// Columns read when loading a full entity, identifier columns first.
    pub fn load_columns(&self) -> Vec<Column> {
        let mut cols: Vec<Column> = Vec::new();
        let mut push = |col: &Column| {
            if !cols.iter().any(|c| c.name == col.name) {
                cols.push(col.clone());
            }
        };

        for id in self.id_columns() {
            if let Some(col) = self.table.column(id) {
                push(col);
            }
        }

        for field in &self.fields {
            match &field.kind {
                FieldKind::Id { column }
                | FieldKind::KeyProperty { column }
                | FieldKind::Basic { column } => push(column),
                FieldKind::Embedded { columns, .. } => {
                    for col in columns {
                        push(&col.column)
                    }
                }
                FieldKind::ManyToOne { link, .. } => {
                    for pair in &link.columns {
                        if let Some(col) = self.table.column(&pair.source) {
                            push(col);
                        }
                    }
                }
                _ => (),
            }
        }

        cols
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDefinition {
    /// Fully qualified type name, e.g. `com.acme.Status`.
    pub type_name: String,
    pub constants: Vec<String>,
}

impl EnumDefinition {
    /// Check if `name` refers to this enum, either fully qualified or by its
    /// last segment.
    pub fn matches_name(&self, name: &str) -> bool {
        if self.type_name == name {
            return true;
        }
        match self.type_name.rsplit_once('.') {
            Some((_, simple)) => simple == name,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumConstant {
    pub type_name: String,
    pub name: String,
    pub ordinal: usize,
}
