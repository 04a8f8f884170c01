//! SQLite execution backend for metaorm.
//!
//! Wraps a single `rusqlite` connection. Statements are prepared through the
//! connection's statement cache, so the repeated shapes the query compiler
//! emits are parsed once.

use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tracing::info;

use metaorm_core::{Backend, BackendError};
use metaorm_proto::{Raw, Row};

/// SQLite backend.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory().map_err(backend_error)?;
        info!("opened in-memory sqlite database");
        Ok(Self { conn })
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(backend_error)?;
        info!(path = %path.display(), "opened sqlite database");
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Run a batch of `;`-separated statements, e.g. a schema script.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        self.conn.execute_batch(sql).map_err(backend_error)
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Backend for SqliteBackend {
    fn execute(&self, sql: &str, bindings: &[Raw]) -> Result<Vec<Row>, BackendError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(backend_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt
            .query(params_from_iter(bindings.iter().map(to_sql)))
            .map_err(backend_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(backend_error)? {
            let mut mapped = Row::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row.get_ref(i).map_err(backend_error)?;
                mapped.push(name.as_str(), from_sql(value));
            }
            out.push(mapped);
        }
        Ok(out)
    }
}

fn backend_error(err: rusqlite::Error) -> BackendError {
    BackendError::new(err.to_string())
}

fn to_sql(raw: &Raw) -> SqlValue {
    match raw {
        Raw::Null => SqlValue::Null,
        Raw::Integer(i) => SqlValue::Integer(*i),
        Raw::Real(f) => SqlValue::Real(*f),
        Raw::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Raw {
    match value {
        ValueRef::Null => Raw::Null,
        ValueRef::Integer(i) => Raw::Integer(i),
        ValueRef::Real(f) => Raw::Real(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Raw::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
