//! Resolved entity models.
//!
//! An [`EntityModel`] is an [`EntityDef`] whose cast declarations have been
//! resolved against a [`CastRegistry`] and whose wiring has been validated.
//! Models are immutable and shared by `Arc` between entities.

use std::collections::{HashMap, HashSet};

use super::entity::{Discriminator, EntityDef, MetaTableDef};
use super::relation::RelationDef;
use crate::cast::{CastRegistry, CastSpec};
use crate::error::Error;
use metaorm_proto::FilterExpr;

/// Capability of an entity type to carry key-value meta.
///
/// Decided once at registration: a model either has resolved meta wiring or
/// it does not.
pub trait MetaCapable {
    /// Entity type name.
    fn entity_name(&self) -> &str;

    /// Resolved meta wiring, if any.
    fn meta_model(&self) -> Option<&MetaModel>;

    /// Resolved meta wiring, or [`Error::MetaNotSupported`].
    fn require_meta(&self) -> Result<&MetaModel, Error> {
        self.meta_model()
            .ok_or_else(|| Error::MetaNotSupported(self.entity_name().to_string()))
    }
}

/// Resolved key-value side table of an entity type.
#[derive(Debug)]
pub struct MetaModel {
    table: MetaTableDef,
    casts: HashMap<String, CastSpec>,
    default_cast: CastSpec,
}

impl MetaModel {
    /// Meta table name.
    pub fn table(&self) -> &str {
        &self.table.table
    }

    /// Owner column.
    pub fn owner_column(&self) -> &str {
        &self.table.owner_column
    }

    /// Key column.
    pub fn key_column(&self) -> &str {
        &self.table.key_column
    }

    /// Value column.
    pub fn value_column(&self) -> &str {
        &self.table.value_column
    }

    /// Record id column.
    pub fn id_column(&self) -> &str {
        &self.table.id_column
    }

    /// Cast for a meta key; undeclared keys store scalars as text and read back strings.
    pub fn cast_for(&self, key: &str) -> &CastSpec {
        self.casts.get(key).unwrap_or(&self.default_cast)
    }

    /// Whether a key has a declared cast.
    pub fn is_declared(&self, key: &str) -> bool {
        self.casts.contains_key(key)
    }
}

/// Resolved entity type.
#[derive(Debug)]
pub struct EntityModel {
    def: EntityDef,
    columns: HashMap<String, CastSpec>,
    default_cast: CastSpec,
    meta: Option<MetaModel>,
}

impl EntityModel {
    /// Resolve a definition against a cast registry.
    pub fn resolve(def: EntityDef, casts: &CastRegistry) -> Result<Self, Error> {
        if def.name.is_empty() || def.table.is_empty() || def.primary_key.is_empty() {
            return Err(Error::Config(format!(
                "entity '{}' needs a name, a table and a primary key",
                def.name
            )));
        }

        let mut columns = HashMap::with_capacity(def.casts.len());
        for (column, tag) in &def.casts {
            columns.insert(column.clone(), casts.resolve(tag)?);
        }

        let meta = match &def.meta {
            Some(table) => {
                let mut meta_casts = HashMap::with_capacity(def.meta_casts.len());
                for (key, tag) in &def.meta_casts {
                    meta_casts.insert(key.clone(), casts.resolve(tag)?);
                }
                Some(MetaModel {
                    table: table.clone(),
                    casts: meta_casts,
                    default_cast: casts.resolve("text")?,
                })
            }
            None if !def.meta_casts.is_empty() => {
                return Err(Error::MetaNotSupported(def.name.clone()));
            }
            None => None,
        };

        let mut seen = HashSet::new();
        for relation in &def.relations {
            if !seen.insert(relation.name.as_str()) {
                return Err(Error::Config(format!(
                    "relation '{}' declared twice on '{}'",
                    relation.name, def.name
                )));
            }
            if relation.is_many_to_many() != relation.pivot.is_some() {
                return Err(Error::Config(format!(
                    "relation '{}' on '{}': a pivot table is required for, and only for, many-to-many",
                    relation.name, def.name
                )));
            }
        }

        let model = Self {
            default_cast: casts.resolve("raw")?,
            def,
            columns,
            meta,
        };

        // The discriminator is stamped on every insert; make sure it encodes.
        if let Some(discriminator) = &model.def.discriminator {
            model
                .column_cast(&discriminator.column)
                .encode(&discriminator.value)?;
        }

        Ok(model)
    }

    /// Entity type name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Base table.
    pub fn table(&self) -> &str {
        &self.def.table
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &str {
        &self.def.primary_key
    }

    /// The definition this model was resolved from.
    pub fn def(&self) -> &EntityDef {
        &self.def
    }

    /// Cast for a column; undeclared columns use the raw storage mapping.
    pub fn column_cast(&self, column: &str) -> &CastSpec {
        self.columns.get(column).unwrap_or(&self.default_cast)
    }

    /// Look up a relation, failing with [`Error::UnknownRelation`].
    pub fn relation(&self, name: &str) -> Result<&RelationDef, Error> {
        self.def
            .get_relation(name)
            .ok_or_else(|| Error::UnknownRelation {
                entity: self.def.name.clone(),
                relation: name.to_string(),
            })
    }

    /// All relations in declaration order.
    pub fn relations(&self) -> &[RelationDef] {
        &self.def.relations
    }

    /// Subtype discriminator.
    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.def.discriminator.as_ref()
    }

    /// Discriminator and default filters combined, if any.
    pub fn default_filter(&self) -> Option<FilterExpr> {
        let mut parts = Vec::new();
        if let Some(d) = &self.def.discriminator {
            parts.push(FilterExpr::eq(d.column.clone(), d.value.clone()));
        }
        parts.extend(self.def.default_filters.iter().cloned());
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(FilterExpr::And(parts)),
        }
    }
}

impl MetaCapable for EntityModel {
    fn entity_name(&self) -> &str {
        &self.def.name
    }

    fn meta_model(&self) -> Option<&MetaModel> {
        self.meta.as_ref()
    }
}
