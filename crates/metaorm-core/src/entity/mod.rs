//! Entities: rows of a mapped table with typed access and change tracking.
//!
//! An [`Entity`] owns its raw column values. Typed reads and writes go
//! through the column casts resolved on its [`EntityModel`]; writes mark the
//! column dirty until the next successful [`Entity::save`].

mod persist;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::catalog::EntityModel;
use crate::error::Error;
use crate::meta::MetaCache;
use metaorm_proto::{Identifier, Raw, Row, Value};

/// Eager-loaded relation result attached to an owner.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// One-to-one relation: the related entity, if any.
    One(Option<Box<Entity>>),
    /// One-to-many or many-to-many relation, in key order.
    Many(Vec<Entity>),
}

impl Related {
    /// Related entities as a slice (zero or one for single relations).
    pub fn entities(&self) -> &[Entity] {
        match self {
            Related::One(Some(entity)) => std::slice::from_ref(entity.as_ref()),
            Related::One(None) => &[],
            Related::Many(entities) => entities,
        }
    }
}

/// A mapped row.
#[derive(Debug, Clone)]
pub struct Entity {
    model: Arc<EntityModel>,
    primary_key: Option<Identifier>,
    attributes: Vec<(String, Raw)>,
    dirty: BTreeSet<String>,
    meta_cache: Option<MetaCache>,
    relations: HashMap<String, Related>,
    projections: Vec<(String, Option<Value>)>,
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name()
            && self.primary_key == other.primary_key
            && self.attributes == other.attributes
    }
}

impl Entity {
    /// Create a new, unsaved entity.
    ///
    /// Subtypes get their discriminator column stamped so the first save
    /// inserts it.
    pub fn new(model: Arc<EntityModel>) -> Self {
        let mut entity = Self {
            model,
            primary_key: None,
            attributes: Vec::new(),
            dirty: BTreeSet::new(),
            meta_cache: None,
            relations: HashMap::new(),
            projections: Vec::new(),
        };
        if let Some(discriminator) = entity.model.discriminator().cloned() {
            // Encodability is checked when the model is registered.
            if let Ok(raw) = entity
                .model
                .column_cast(&discriminator.column)
                .encode(&discriminator.value)
            {
                entity.store(discriminator.column, raw);
            }
        }
        entity
    }

    /// Materialize a persisted entity from a result row.
    ///
    /// The row must carry the primary key column. Nothing is marked dirty.
    pub fn from_row(model: Arc<EntityModel>, row: Row) -> Result<Self, Error> {
        let primary_key = row
            .get(model.primary_key())
            .and_then(Identifier::from_raw)
            .ok_or_else(|| {
                Error::InvalidQuery(format!(
                    "row for '{}' has no usable primary key '{}'",
                    model.name(),
                    model.primary_key()
                ))
            })?;

        Ok(Self {
            model,
            primary_key: Some(primary_key),
            attributes: row.into_columns(),
            dirty: BTreeSet::new(),
            meta_cache: None,
            relations: HashMap::new(),
            projections: Vec::new(),
        })
    }

    /// The entity's model.
    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    /// Entity type name.
    pub fn entity_name(&self) -> &str {
        self.model.name()
    }

    /// Primary key, once persisted.
    pub fn id(&self) -> Option<&Identifier> {
        self.primary_key.as_ref()
    }

    /// Primary key, or [`Error::NotPersisted`].
    pub fn require_id(&self) -> Result<&Identifier, Error> {
        self.primary_key
            .as_ref()
            .ok_or_else(|| Error::NotPersisted(self.model.name().to_string()))
    }

    /// Whether the entity has never been persisted.
    pub fn is_new(&self) -> bool {
        self.primary_key.is_none()
    }

    /// Read a column through its cast. Unset and NULL columns read as `None`.
    pub fn get(&self, column: &str) -> Result<Option<Value>, Error> {
        match self.raw(column) {
            Some(raw) => self.model.column_cast(column).decode(raw),
            None => Ok(None),
        }
    }

    /// Raw stored value of a column.
    pub fn raw(&self, column: &str) -> Option<&Raw> {
        self.attributes
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, raw)| raw)
    }

    /// Write a column through its cast and mark it dirty.
    ///
    /// Fails with [`Error::CastEncode`] before touching the entity when the
    /// value is not representable.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<(), Error> {
        let raw = self.model.column_cast(column).encode(&value.into())?;
        self.store(column.to_string(), raw);
        self.dirty.insert(column.to_string());
        Ok(())
    }

    /// Set a column to NULL and mark it dirty.
    pub fn set_null(&mut self, column: &str) {
        self.store(column.to_string(), Raw::Null);
        self.dirty.insert(column.to_string());
    }

    fn store(&mut self, column: String, raw: Raw) {
        match self.attributes.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = raw,
            None => self.attributes.push((column, raw)),
        }
    }

    /// Whether a column has unsaved changes.
    pub fn is_dirty(&self, column: &str) -> bool {
        self.dirty.contains(column)
    }

    /// Columns with unsaved changes, sorted.
    pub fn dirty_columns(&self) -> Vec<&str> {
        self.dirty.iter().map(String::as_str).collect()
    }

    /// Whether any column has unsaved changes.
    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Column names in storage order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(name, _)| name.as_str())
    }

    /// A loaded relation, if it was eager-loaded.
    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Whether a relation has been loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Entities of a loaded relation; empty when not loaded.
    pub fn related_many(&self, name: &str) -> &[Entity] {
        self.relations
            .get(name)
            .map(Related::entities)
            .unwrap_or(&[])
    }

    /// Entity of a loaded single relation.
    pub fn related_one(&self, name: &str) -> Option<&Entity> {
        self.related_many(name).first()
    }

    pub(crate) fn attach(&mut self, name: &str, related: Related) {
        self.relations.insert(name.to_string(), related);
    }

    /// A meta projection surfaced by the query, decoded.
    pub fn projection(&self, alias: &str) -> Option<&Value> {
        self.projections
            .iter()
            .find(|(name, _)| name == alias)
            .and_then(|(_, value)| value.as_ref())
    }

    /// All projections in query order.
    pub fn projections(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.projections
            .iter()
            .map(|(alias, value)| (alias.as_str(), value.as_ref()))
    }

    pub(crate) fn push_projection(&mut self, alias: &str, value: Option<Value>) {
        self.projections.push((alias.to_string(), value));
    }

    /// Preloaded meta cache, if any.
    pub fn meta_cache(&self) -> Option<&MetaCache> {
        self.meta_cache.as_ref()
    }

    pub(crate) fn meta_cache_mut(&mut self) -> Option<&mut MetaCache> {
        self.meta_cache.as_mut()
    }

    pub(crate) fn merge_meta_cache(&mut self, cache: MetaCache) {
        match &mut self.meta_cache {
            Some(existing) => existing.merge(cache),
            None => self.meta_cache = Some(cache),
        }
    }
}
