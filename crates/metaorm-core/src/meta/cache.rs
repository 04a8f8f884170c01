//! Per-entity meta cache populated by preloading.

use std::collections::HashMap;

use metaorm_proto::Raw;

/// Meta records known for one entity, keyed by meta key.
///
/// An entry of `None` records that the key is known to be absent. A complete
/// cache covers every key: keys without an entry are absent too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaCache {
    entries: HashMap<String, Option<Raw>>,
    complete: bool,
}

impl MetaCache {
    /// Create an empty cache.
    pub fn new(complete: bool) -> Self {
        Self {
            entries: HashMap::new(),
            complete,
        }
    }

    /// Look up a key.
    ///
    /// Returns `None` when the cache does not cover the key, `Some(None)` when
    /// the key is known to be absent.
    pub fn lookup(&self, key: &str) -> Option<Option<&Raw>> {
        match self.entries.get(key) {
            Some(entry) => Some(entry.as_ref()),
            None if self.complete => Some(None),
            None => None,
        }
    }

    /// Whether the cache answers for this key.
    pub fn covers(&self, key: &str) -> bool {
        self.complete || self.entries.contains_key(key)
    }

    /// Whether the cache covers every key.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Record a value (or absence) for a key, replacing any previous entry.
    pub fn set(&mut self, key: impl Into<String>, raw: Option<Raw>) {
        self.entries.insert(key.into(), raw);
    }

    /// Record a value unless the key already has one. First record wins.
    pub(crate) fn insert_first(&mut self, key: &str, raw: Raw) {
        match self.entries.get_mut(key) {
            Some(slot @ None) => *slot = Some(raw),
            Some(Some(_)) => {}
            None => {
                self.entries.insert(key.to_string(), Some(raw));
            }
        }
    }

    /// Fold a fresher cache into this one. Entries of `other` win.
    pub(crate) fn merge(&mut self, other: MetaCache) {
        if other.complete {
            self.entries.clear();
        }
        self.entries.extend(other.entries);
        self.complete |= other.complete;
    }

    /// Keys with a present record.
    pub fn present_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }
}
