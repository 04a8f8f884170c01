//! Reads and writes of key-value meta records.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use super::MetaCache;
use crate::backend::{run, transaction, Backend};
use crate::catalog::{EntityModel, MetaCapable, MetaModel};
use crate::entity::Entity;
use crate::error::Error;
use crate::query::sql::{placeholders, quote_ident};
use metaorm_proto::{Identifier, Raw, Value};

/// Access to the meta table of meta-capable entities.
///
/// Stateless apart from the cache kept on each [`Entity`]: a key covered by
/// the entity's cache is answered from it and never refetched.
pub struct MetaBridge<'a> {
    backend: &'a dyn Backend,
}

impl<'a> MetaBridge<'a> {
    /// Create a bridge over a backend.
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Read a meta value through the key's cast.
    ///
    /// Absent keys and NULL values read as `None`. Unsaved entities own no
    /// records and read `None` without a query.
    pub fn get_meta_value(&self, entity: &Entity, key: &str) -> Result<Option<Value>, Error> {
        let meta = entity.model().require_meta()?;
        let cast = meta.cast_for(key);

        if let Some(cached) = entity.meta_cache().and_then(|cache| cache.lookup(key)) {
            return match cached {
                Some(raw) => cast.decode(raw),
                None => Ok(None),
            };
        }

        match entity.id() {
            Some(id) => match self.first_value(meta, id, key)? {
                Some(raw) => cast.decode(&raw),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Read a meta value bypassing any cache.
    pub fn fetch_meta_value(
        &self,
        model: &EntityModel,
        id: &Identifier,
        key: &str,
    ) -> Result<Option<Value>, Error> {
        let meta = model.require_meta()?;
        match self.first_value(meta, id, key)? {
            Some(raw) => meta.cast_for(key).decode(&raw),
            None => Ok(None),
        }
    }

    /// Check whether a record exists for the key, without decoding it.
    pub fn has_meta(&self, entity: &Entity, key: &str) -> Result<bool, Error> {
        let meta = entity.model().require_meta()?;

        if let Some(cached) = entity.meta_cache().and_then(|cache| cache.lookup(key)) {
            return Ok(cached.is_some());
        }
        let Some(id) = entity.id() else {
            return Ok(false);
        };

        let sql = format!(
            "SELECT 1 AS \"present\" FROM {} WHERE {} = ? AND {} = ? LIMIT 1",
            quote_ident(meta.table()),
            quote_ident(meta.owner_column()),
            quote_ident(meta.key_column())
        );
        let rows = run(self.backend, &sql, &[id.to_raw(), Raw::Text(key.to_string())])?;
        Ok(!rows.is_empty())
    }

    /// Write a meta value.
    ///
    /// The value is encoded before any statement runs. The first record for
    /// the key (by record id) is updated in place; without one a record is
    /// inserted. A cache on the entity is updated to the written value.
    pub fn set_meta(
        &self,
        entity: &mut Entity,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let model = entity.model().clone();
        let meta = model.require_meta()?;
        let raw = meta.cast_for(key).encode(&value.into())?;
        let id = entity.require_id()?.clone();

        transaction(self.backend, |tx| {
            let select = format!(
                "SELECT {} AS \"id\" FROM {} WHERE {} = ? AND {} = ? ORDER BY {} ASC LIMIT 1",
                quote_ident(meta.id_column()),
                quote_ident(meta.table()),
                quote_ident(meta.owner_column()),
                quote_ident(meta.key_column()),
                quote_ident(meta.id_column())
            );
            let existing = run(tx, &select, &[id.to_raw(), Raw::Text(key.to_string())])?;

            match existing.first().and_then(|row| row.get("id")) {
                Some(record_id) => {
                    let update = format!(
                        "UPDATE {} SET {} = ? WHERE {} = ?",
                        quote_ident(meta.table()),
                        quote_ident(meta.value_column()),
                        quote_ident(meta.id_column())
                    );
                    run(tx, &update, &[raw.clone(), record_id.clone()])?;
                }
                None => {
                    let insert = format!(
                        "INSERT INTO {} ({}, {}, {}) VALUES ({})",
                        quote_ident(meta.table()),
                        quote_ident(meta.owner_column()),
                        quote_ident(meta.key_column()),
                        quote_ident(meta.value_column()),
                        placeholders(3)
                    );
                    run(
                        tx,
                        &insert,
                        &[id.to_raw(), Raw::Text(key.to_string()), raw.clone()],
                    )?;
                }
            }
            Ok(())
        })?;

        debug!(entity = model.name(), id = %id, key, "meta value written");
        if let Some(cache) = entity.meta_cache_mut() {
            cache.set(key, Some(raw));
        }
        Ok(())
    }

    /// Delete every record for the key. The entity's cache records the key
    /// as absent.
    pub fn delete_meta(&self, entity: &mut Entity, key: &str) -> Result<(), Error> {
        let model = entity.model().clone();
        let meta = model.require_meta()?;
        let id = entity.require_id()?.clone();

        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            quote_ident(meta.table()),
            quote_ident(meta.owner_column()),
            quote_ident(meta.key_column())
        );
        run(self.backend, &sql, &[id.to_raw(), Raw::Text(key.to_string())])?;

        debug!(entity = model.name(), id = %id, key, "meta value deleted");
        let mut absent = MetaCache::new(false);
        absent.set(key, None);
        entity.merge_meta_cache(absent);
        Ok(())
    }

    /// Load meta records for a set of entities with a single query.
    ///
    /// With an empty key list every key is loaded and the resulting caches
    /// are complete. Requested keys without a record are cached as absent.
    /// No query is issued when no entity is persisted.
    #[instrument(skip_all, fields(entities = entities.len(), keys = keys.len()))]
    pub fn preload<K: AsRef<str>>(
        &self,
        entities: &mut [Entity],
        keys: &[K],
    ) -> Result<(), Error> {
        let Some(first) = entities.first() else {
            return Ok(());
        };
        let model = first.model().clone();
        let meta = model.require_meta()?;
        if let Some(other) = entities.iter().find(|e| e.entity_name() != model.name()) {
            return Err(Error::InvalidQuery(format!(
                "cannot preload meta for '{}' together with '{}'",
                other.entity_name(),
                model.name()
            )));
        }

        let mut owners = Vec::new();
        let mut seen = HashSet::new();
        for entity in entities.iter() {
            if let Some(id) = entity.id() {
                if seen.insert(id.clone()) {
                    owners.push(id.clone());
                }
            }
        }
        if owners.is_empty() {
            return Ok(());
        }

        let mut bindings: Vec<Raw> = owners.iter().map(Identifier::to_raw).collect();
        let mut sql = format!(
            "SELECT m.{} AS \"owner\", m.{} AS \"key\", m.{} AS \"value\" FROM {} m WHERE m.{} IN ({})",
            quote_ident(meta.owner_column()),
            quote_ident(meta.key_column()),
            quote_ident(meta.value_column()),
            quote_ident(meta.table()),
            quote_ident(meta.owner_column()),
            placeholders(owners.len())
        );
        if !keys.is_empty() {
            sql.push_str(&format!(
                " AND m.{} IN ({})",
                quote_ident(meta.key_column()),
                placeholders(keys.len())
            ));
            bindings.extend(keys.iter().map(|k| Raw::Text(k.as_ref().to_string())));
        }
        sql.push_str(&format!(" ORDER BY m.{} ASC", quote_ident(meta.id_column())));

        let rows = run(self.backend, &sql, &bindings)?;

        let complete = keys.is_empty();
        let mut caches: HashMap<Identifier, MetaCache> = owners
            .into_iter()
            .map(|id| {
                let mut cache = MetaCache::new(complete);
                for key in keys {
                    cache.set(key.as_ref(), None);
                }
                (id, cache)
            })
            .collect();

        for row in &rows {
            let (Some(owner), Some(key)) = (
                row.get("owner").and_then(Identifier::from_raw),
                row.get("key").and_then(Raw::as_text),
            ) else {
                continue;
            };
            if let Some(cache) = caches.get_mut(&owner) {
                let value = row.get("value").cloned().unwrap_or(Raw::Null);
                cache.insert_first(&key, value);
            }
        }

        debug!(records = rows.len(), "meta preloaded");
        for entity in entities.iter_mut() {
            if let Some(cache) = entity.id().and_then(|id| caches.get(id)) {
                let cache = cache.clone();
                entity.merge_meta_cache(cache);
            }
        }
        Ok(())
    }

    fn first_value(
        &self,
        meta: &MetaModel,
        id: &Identifier,
        key: &str,
    ) -> Result<Option<Raw>, Error> {
        let sql = format!(
            "SELECT {} AS \"value\" FROM {} WHERE {} = ? AND {} = ? ORDER BY {} ASC LIMIT 1",
            quote_ident(meta.value_column()),
            quote_ident(meta.table()),
            quote_ident(meta.owner_column()),
            quote_ident(meta.key_column()),
            quote_ident(meta.id_column())
        );
        let mut rows = run(self.backend, &sql, &[id.to_raw(), Raw::Text(key.to_string())])?;
        Ok(rows.first_mut().and_then(|row| row.take("value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::entity::fixtures::{model, post_row};
    use metaorm_proto::Row;

    fn post(id: i64) -> Entity {
        Entity::from_row(model("Post"), post_row(id, 1)).unwrap()
    }

    #[test]
    fn test_get_meta_value_decodes_first_record() {
        let backend = ScriptedBackend::new();
        backend.respond(vec![Row::new().with("value", "150")]);
        let bridge = MetaBridge::new(&backend);

        let value = bridge.get_meta_value(&post(1), "price").unwrap();
        assert_eq!(value, Some(Value::Int(150)));

        let calls = backend.calls();
        assert_eq!(
            calls[0].0,
            "SELECT \"meta_value\" AS \"value\" FROM \"postmeta\" WHERE \"post_id\" = ? AND \"meta_key\" = ? ORDER BY \"meta_id\" ASC LIMIT 1"
        );
        assert_eq!(calls[0].1, vec![Raw::Integer(1), Raw::Text("price".into())]);
    }

    #[test]
    fn test_absent_and_null_read_none() {
        let backend = ScriptedBackend::new();
        backend
            .respond(vec![])
            .respond(vec![Row::new().with("value", Raw::Null)]);
        let bridge = MetaBridge::new(&backend);

        assert_eq!(bridge.get_meta_value(&post(1), "price").unwrap(), None);
        assert_eq!(bridge.get_meta_value(&post(1), "price").unwrap(), None);
    }

    #[test]
    fn test_undeclared_key_passes_through_as_string() {
        let backend = ScriptedBackend::new();
        backend.respond(vec![Row::new().with("value", "blue")]);
        let bridge = MetaBridge::new(&backend);

        assert_eq!(
            bridge.get_meta_value(&post(1), "color").unwrap(),
            Some(Value::String("blue".into()))
        );
    }

    #[test]
    fn test_malformed_meta_value() {
        let backend = ScriptedBackend::new();
        backend.respond(vec![Row::new().with("value", "cheap")]);
        let bridge = MetaBridge::new(&backend);

        assert!(matches!(
            bridge.get_meta_value(&post(1), "price"),
            Err(Error::CastDecode { tag, .. }) if tag == "integer"
        ));
    }

    #[test]
    fn test_meta_not_supported() {
        let backend = ScriptedBackend::new();
        let bridge = MetaBridge::new(&backend);
        let mut term =
            Entity::from_row(model("Term"), Row::new().with("term_id", 1i64)).unwrap();

        assert!(matches!(
            bridge.get_meta_value(&term, "color"),
            Err(Error::MetaNotSupported(name)) if name == "Term"
        ));
        assert!(matches!(
            bridge.set_meta(&mut term, "color", "red"),
            Err(Error::MetaNotSupported(_))
        ));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_set_meta_updates_first_record() {
        let backend = ScriptedBackend::new();
        backend
            .respond(vec![])
            .respond(vec![Row::new().with("id", 10i64)]);
        let bridge = MetaBridge::new(&backend);

        let mut entity = post(1);
        bridge.set_meta(&mut entity, "price", 200i64).unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[2].0,
            "UPDATE \"postmeta\" SET \"meta_value\" = ? WHERE \"meta_id\" = ?"
        );
        assert_eq!(calls[2].1, vec![Raw::Integer(200), Raw::Integer(10)]);
        assert_eq!(calls[3].0, "COMMIT");
    }

    #[test]
    fn test_set_meta_inserts_when_missing() {
        let backend = ScriptedBackend::new();
        let bridge = MetaBridge::new(&backend);

        let mut entity = post(1);
        bridge.set_meta(&mut entity, "featured", true).unwrap();

        let calls = backend.calls();
        assert_eq!(
            calls[2].0,
            "INSERT INTO \"postmeta\" (\"post_id\", \"meta_key\", \"meta_value\") VALUES (?, ?, ?)"
        );
        assert_eq!(
            calls[2].1,
            vec![Raw::Integer(1), Raw::Text("featured".into()), Raw::Integer(1)]
        );
    }

    #[test]
    fn test_set_meta_undeclared_key_stores_scalar_text() {
        let backend = ScriptedBackend::new();
        let bridge = MetaBridge::new(&backend);

        let mut entity = post(1);
        bridge.set_meta(&mut entity, "views", 5i64).unwrap();

        let calls = backend.calls();
        assert_eq!(
            calls[2].1,
            vec![Raw::Integer(1), Raw::Text("views".into()), Raw::Text("5".into())]
        );
    }

    #[test]
    fn test_set_meta_encode_failure_issues_nothing() {
        let backend = ScriptedBackend::new();
        let bridge = MetaBridge::new(&backend);

        let mut entity = post(1);
        assert!(matches!(
            bridge.set_meta(&mut entity, "price", "expensive"),
            Err(Error::CastEncode { .. })
        ));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_set_meta_on_new_entity() {
        let backend = ScriptedBackend::new();
        let bridge = MetaBridge::new(&backend);

        let mut entity = Entity::new(model("Post"));
        assert!(matches!(
            bridge.set_meta(&mut entity, "price", 1i64),
            Err(Error::NotPersisted(_))
        ));
        assert_eq!(bridge.get_meta_value(&entity, "price").unwrap(), None);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_preload_single_query_and_cache_hits() {
        let backend = ScriptedBackend::new();
        backend.respond(vec![
            Row::new().with("owner", 1i64).with("key", "price").with("value", "150"),
            Row::new().with("owner", 1i64).with("key", "price").with("value", "999"),
            Row::new().with("owner", 2i64).with("key", "featured").with("value", "1"),
        ]);
        let bridge = MetaBridge::new(&backend);

        let mut entities = vec![post(1), post(2), post(1)];
        bridge.preload(&mut entities, &["price", "featured"]).unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            "SELECT m.\"post_id\" AS \"owner\", m.\"meta_key\" AS \"key\", m.\"meta_value\" AS \"value\" FROM \"postmeta\" m WHERE m.\"post_id\" IN (?, ?) AND m.\"meta_key\" IN (?, ?) ORDER BY m.\"meta_id\" ASC"
        );

        assert_eq!(
            bridge.get_meta_value(&entities[0], "price").unwrap(),
            Some(Value::Int(150))
        );
        assert_eq!(bridge.get_meta_value(&entities[0], "featured").unwrap(), None);
        assert_eq!(
            bridge.get_meta_value(&entities[1], "featured").unwrap(),
            Some(Value::Bool(true))
        );
        assert!(!bridge.has_meta(&entities[1], "price").unwrap());
        assert_eq!(
            bridge.get_meta_value(&entities[2], "price").unwrap(),
            Some(Value::Int(150))
        );
        assert_eq!(backend.calls().len(), 1);

        // Keys outside the preloaded set still go to the backend.
        bridge.get_meta_value(&entities[0], "color").unwrap();
        assert_eq!(backend.calls().len(), 2);
    }

    #[test]
    fn test_preload_all_keys_is_complete() {
        let backend = ScriptedBackend::new();
        backend.respond(vec![]);
        let bridge = MetaBridge::new(&backend);

        let mut entities = vec![post(1)];
        bridge.preload::<&str>(&mut entities, &[]).unwrap();

        assert!(entities[0].meta_cache().unwrap().is_complete());
        assert_eq!(bridge.get_meta_value(&entities[0], "anything").unwrap(), None);
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_preload_empty_set_issues_nothing() {
        let backend = ScriptedBackend::new();
        let bridge = MetaBridge::new(&backend);

        let mut entities: Vec<Entity> = Vec::new();
        bridge.preload(&mut entities, &["price"]).unwrap();
        let mut unsaved = vec![Entity::new(model("Post"))];
        bridge.preload(&mut unsaved, &["price"]).unwrap();

        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_delete_meta_marks_absent() {
        let backend = ScriptedBackend::new();
        let bridge = MetaBridge::new(&backend);

        let mut entity = post(1);
        bridge.delete_meta(&mut entity, "price").unwrap();

        assert_eq!(
            backend.sql(),
            vec!["DELETE FROM \"postmeta\" WHERE \"post_id\" = ? AND \"meta_key\" = ?"]
        );
        assert_eq!(bridge.get_meta_value(&entity, "price").unwrap(), None);
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_set_meta_refreshes_cache() {
        let backend = ScriptedBackend::new();
        backend.respond(vec![
            Row::new().with("owner", 1i64).with("key", "price").with("value", "10"),
        ]);
        let bridge = MetaBridge::new(&backend);

        let mut entities = vec![post(1)];
        bridge.preload(&mut entities, &["price"]).unwrap();
        bridge.set_meta(&mut entities[0], "price", 20i64).unwrap();

        let before = backend.calls().len();
        assert_eq!(
            bridge.get_meta_value(&entities[0], "price").unwrap(),
            Some(Value::Int(20))
        );
        assert_eq!(backend.calls().len(), before);
    }
}
