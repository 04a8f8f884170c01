//! Catalog of resolved entity models.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::model::{EntityModel, MetaCapable};
use super::{EntityDef, SchemaBundle};
use crate::cast::CastRegistry;
use crate::error::Error;

/// The catalog of registered entity types.
///
/// Registration resolves every cast declaration against the catalog's
/// [`CastRegistry`]; a bad tag or bad meta wiring fails here rather than on
/// first use.
pub struct Catalog {
    /// Cast registry shared with every resolved model.
    casts: Arc<CastRegistry>,
    /// Resolved models by entity name.
    models: RwLock<HashMap<String, Arc<EntityModel>>>,
}

impl Catalog {
    /// Create an empty catalog over a cast registry.
    pub fn new(casts: Arc<CastRegistry>) -> Self {
        Self {
            casts,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Build a catalog from a schema bundle.
    ///
    /// Unlike single registrations, a bundle is checked as a whole: every
    /// relation target must be part of it.
    pub fn from_bundle(bundle: SchemaBundle, casts: Arc<CastRegistry>) -> Result<Self, Error> {
        let catalog = Self::new(casts);
        for entity in bundle.entities {
            catalog.register(entity)?;
        }
        catalog.validate()?;
        Ok(catalog)
    }

    /// Build a catalog from a JSON schema bundle.
    pub fn from_json(json: &str, casts: Arc<CastRegistry>) -> Result<Self, Error> {
        Self::from_bundle(SchemaBundle::from_json(json)?, casts)
    }

    /// Register an entity type, replacing any previous one with the same name.
    pub fn register(&self, def: EntityDef) -> Result<Arc<EntityModel>, Error> {
        let model = Arc::new(EntityModel::resolve(def, &self.casts)?);
        debug!(
            entity = model.name(),
            table = model.table(),
            meta = model.meta_model().is_some(),
            relations = model.relations().len(),
            "registered entity type"
        );
        self.models
            .write()
            .insert(model.name().to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// Check that every relation points at a registered entity type.
    pub fn validate(&self) -> Result<(), Error> {
        let models = self.models.read();
        for model in models.values() {
            for relation in model.relations() {
                if !models.contains_key(&relation.target) {
                    return Err(Error::Config(format!(
                        "relation '{}' on '{}' targets unregistered entity '{}'",
                        relation.name,
                        model.name(),
                        relation.target
                    )));
                }
            }
        }
        Ok(())
    }

    /// Get a model by name, failing with [`Error::UnknownEntity`].
    pub fn model(&self, name: &str) -> Result<Arc<EntityModel>, Error> {
        self.get_model(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Get a model by name.
    pub fn get_model(&self, name: &str) -> Option<Arc<EntityModel>> {
        self.models.read().get(name).cloned()
    }

    /// Registered entity names, sorted.
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The cast registry.
    pub fn casts(&self) -> &Arc<CastRegistry> {
        &self.casts
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(Arc::new(CastRegistry::with_builtins()))
    }
}
