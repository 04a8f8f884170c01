//! Cast registry mapping tags to casts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::builtin::{
    ArrayCast, BooleanCast, DateCast, DateTimeCast, FloatCast, IntegerCast, JsonCast, RawCast,
    StringCast, TextCast,
};
use super::{Cast, CastSpec, FnCast};
use crate::error::Error;
use metaorm_proto::{Raw, Value};

/// Registry of casts keyed by tag.
///
/// Tags are case-insensitive. Registering an existing tag replaces it, which
/// lets callers override a built-in before any entity model is resolved.
pub struct CastRegistry {
    casts: RwLock<HashMap<String, CastSpec>>,
}

impl CastRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            casts: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding the built-in casts.
    ///
    /// Tags: `raw`, `string`, `text`, `integer` (`int`), `float` (`double`),
    /// `boolean` (`bool`), `date`, `datetime`, `array` (`collection`), `json`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_cast("raw", RawCast);
        registry.register_cast("string", StringCast);
        registry.register_cast("text", TextCast);
        registry.register_cast("integer", IntegerCast);
        registry.alias("int", "integer");
        registry.register_cast("float", FloatCast);
        registry.alias("double", "float");
        registry.register_cast("boolean", BooleanCast);
        registry.alias("bool", "boolean");
        registry.register_cast("date", DateCast);
        registry.register_cast("datetime", DateTimeCast);
        registry.register_cast("array", ArrayCast);
        registry.alias("collection", "array");
        registry.register_cast("json", JsonCast);
        registry
    }

    fn normalize(tag: &str) -> String {
        tag.trim().to_ascii_lowercase()
    }

    /// Register a cast from encode/decode functions.
    pub fn register<E, D>(&self, tag: &str, encode: E, decode: D)
    where
        E: Fn(&Value) -> Result<Raw, String> + Send + Sync + 'static,
        D: Fn(&Raw) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register_cast(tag, FnCast::new(encode, decode));
    }

    /// Register a cast implementation.
    pub fn register_cast(&self, tag: &str, cast: impl Cast + 'static) {
        let tag = Self::normalize(tag);
        let spec = CastSpec::new(&tag, Arc::new(cast));
        self.casts.write().insert(tag, spec);
    }

    fn alias(&self, alias: &str, target: &str) {
        let mut casts = self.casts.write();
        if let Some(spec) = casts.get(target).cloned() {
            casts.insert(alias.to_string(), spec);
        }
    }

    /// Resolve a tag to its cast.
    pub fn resolve(&self, tag: &str) -> Result<CastSpec, Error> {
        self.casts
            .read()
            .get(&Self::normalize(tag))
            .cloned()
            .ok_or_else(|| Error::UnknownCastKind(tag.to_string()))
    }

    /// Check whether a tag is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.casts.read().contains_key(&Self::normalize(tag))
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.casts.read().keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl Default for CastRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
