//! Saving and deleting entities.

use tracing::{info, warn};

use super::Entity;
use crate::backend::{run, transaction, Backend};
use crate::catalog::MetaCapable;
use crate::error::Error;
use crate::query::sql::{placeholders, quote_ident};
use metaorm_proto::{Identifier, Raw};

impl Entity {
    /// Persist the entity.
    ///
    /// New entities are inserted with every attribute and receive the key the
    /// backend returns. Persisted entities update their dirty columns only;
    /// with nothing dirty no statement is issued. The dirty set is cleared only
    /// after the backend confirmed the write, so a failed save can be retried.
    pub fn save(&mut self, backend: &dyn Backend) -> Result<(), Error> {
        let result = match self.primary_key.clone() {
            None => self.insert(backend),
            Some(_) if self.dirty.is_empty() => return Ok(()),
            Some(id) => self.update(backend, &id),
        };

        match result {
            Ok(id) => {
                info!(
                    entity = self.model.name(),
                    id = %id,
                    columns = self.dirty.len(),
                    "saved entity"
                );
                self.store(self.model.primary_key().to_string(), id.to_raw());
                self.primary_key = Some(id);
                self.dirty.clear();
                Ok(())
            }
            Err(err) => {
                let err = self.persistence_error(err);
                warn!(entity = self.model.name(), error = %err, "save rejected");
                Err(err)
            }
        }
    }

    fn insert(&self, backend: &dyn Backend) -> Result<Identifier, Error> {
        let table = quote_ident(self.model.table());
        let pk = quote_ident(self.model.primary_key());

        let (sql, bindings) = if self.attributes.is_empty() {
            (
                format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, pk),
                Vec::new(),
            )
        } else {
            let columns: Vec<String> = self
                .attributes
                .iter()
                .map(|(name, _)| quote_ident(name))
                .collect();
            (
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                    table,
                    columns.join(", "),
                    placeholders(columns.len()),
                    pk
                ),
                self.attributes.iter().map(|(_, raw)| raw.clone()).collect(),
            )
        };

        let rows = run(backend, &sql, &bindings)?;
        self.returned_key(rows.first().and_then(|row| row.get(self.model.primary_key())))
            .ok_or_else(|| Error::persistence(self.model.name(), "insert returned no primary key"))
    }

    fn update(&self, backend: &dyn Backend, id: &Identifier) -> Result<Identifier, Error> {
        let mut assignments = Vec::with_capacity(self.dirty.len());
        let mut bindings = Vec::with_capacity(self.dirty.len() + 1);
        for column in &self.dirty {
            assignments.push(format!("{} = ?", quote_ident(column)));
            bindings.push(self.raw(column).cloned().unwrap_or(Raw::Null));
        }
        bindings.push(id.to_raw());

        let pk = quote_ident(self.model.primary_key());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ? RETURNING {}",
            quote_ident(self.model.table()),
            assignments.join(", "),
            pk,
            pk
        );

        let rows = run(backend, &sql, &bindings)?;
        if rows.is_empty() {
            return Err(Error::persistence(
                self.model.name(),
                format!("row with {} = {} does not exist", self.model.primary_key(), id),
            ));
        }
        Ok(self
            .returned_key(rows[0].get(self.model.primary_key()))
            .unwrap_or_else(|| id.clone()))
    }

    fn returned_key(&self, raw: Option<&Raw>) -> Option<Identifier> {
        raw.and_then(Identifier::from_raw)
    }

    /// Delete the entity's row and every meta record it owns.
    ///
    /// Both deletes run in one transaction. The entity keeps its key and
    /// attributes but loses cached meta and loaded relations.
    pub fn delete(&mut self, backend: &dyn Backend) -> Result<(), Error> {
        let id = self.require_id()?.clone();
        let model = self.model.clone();

        let result = transaction(backend, |tx| {
            if let Some(meta) = model.meta_model() {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ?",
                    quote_ident(meta.table()),
                    quote_ident(meta.owner_column())
                );
                run(tx, &sql, &[id.to_raw()])?;
            }

            let pk = quote_ident(model.primary_key());
            let sql = format!(
                "DELETE FROM {} WHERE {} = ? RETURNING {}",
                quote_ident(model.table()),
                pk,
                pk
            );
            if run(tx, &sql, &[id.to_raw()])?.is_empty() {
                return Err(Error::persistence(
                    model.name(),
                    format!("row with {} = {} does not exist", model.primary_key(), id),
                ));
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                info!(entity = model.name(), id = %id, "deleted entity");
                self.meta_cache = None;
                self.relations.clear();
                Ok(())
            }
            Err(err) => {
                let err = self.persistence_error(err);
                warn!(entity = model.name(), error = %err, "delete rejected");
                Err(err)
            }
        }
    }

    /// Backend failures during a write surface as persistence errors that
    /// keep the backend's message.
    fn persistence_error(&self, err: Error) -> Error {
        match err {
            Error::Backend(backend) => Error::persistence(self.model.name(), backend.message),
            other => other,
        }
    }
}
