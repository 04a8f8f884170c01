//! Entity definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::relation::RelationDef;
use metaorm_proto::{FilterExpr, Value};

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_key_column() -> String {
    "meta_key".to_string()
}

fn default_value_column() -> String {
    "meta_value".to_string()
}

fn default_id_column() -> String {
    "meta_id".to_string()
}

/// An entity type as supplied by the schema/config source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity type name (unique within a catalog).
    pub name: String,
    /// Base table name.
    pub table: String,
    /// Primary key column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Key-value side table wiring, if this type carries meta.
    #[serde(default)]
    pub meta: Option<MetaTableDef>,
    /// Cast tags per column.
    #[serde(default)]
    pub casts: BTreeMap<String, String>,
    /// Cast tags per meta key.
    #[serde(default)]
    pub meta_casts: BTreeMap<String, String>,
    /// Relations owned by this type.
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Type discriminator for subtypes sharing a table.
    #[serde(default)]
    pub discriminator: Option<Discriminator>,
    /// Filters applied to every query of this type unless opted out.
    #[serde(default)]
    pub default_filters: Vec<FilterExpr>,
}

/// Key-value side table wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTableDef {
    /// Meta table name.
    pub table: String,
    /// Column holding the owner's primary key.
    pub owner_column: String,
    /// Column holding the meta key.
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Column holding the raw meta value.
    #[serde(default = "default_value_column")]
    pub value_column: String,
    /// Record id column; defines first-match order.
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

/// Column/value pair identifying a subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discriminator {
    /// Discriminator column.
    pub column: String,
    /// Value identifying this subtype.
    pub value: Value,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            meta: None,
            casts: BTreeMap::new(),
            meta_casts: BTreeMap::new(),
            relations: Vec::new(),
            discriminator: None,
            default_filters: Vec::new(),
        }
    }

    /// Set the primary key column.
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Attach a meta table.
    pub fn with_meta(mut self, meta: MetaTableDef) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Declare a column cast.
    pub fn with_cast(mut self, column: impl Into<String>, tag: impl Into<String>) -> Self {
        self.casts.insert(column.into(), tag.into());
        self
    }

    /// Declare a meta key cast.
    pub fn with_meta_cast(mut self, key: impl Into<String>, tag: impl Into<String>) -> Self {
        self.meta_casts.insert(key.into(), tag.into());
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Mark this definition as a subtype selected by `column = value`.
    pub fn with_discriminator(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.discriminator = Some(Discriminator {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Add a default filter.
    pub fn with_default_filter(mut self, filter: FilterExpr) -> Self {
        self.default_filters.push(filter);
        self
    }

    /// Get a relation by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }
}

impl MetaTableDef {
    /// Create meta wiring with conventional key/value/id column names.
    pub fn new(table: impl Into<String>, owner_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            owner_column: owner_column.into(),
            key_column: default_key_column(),
            value_column: default_value_column(),
            id_column: default_id_column(),
        }
    }

    /// Set the record id column.
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Set the key and value columns.
    pub fn with_columns(
        mut self,
        key_column: impl Into<String>,
        value_column: impl Into<String>,
    ) -> Self {
        self.key_column = key_column.into();
        self.value_column = value_column.into();
        self
    }
}
