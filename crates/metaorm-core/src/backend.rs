//! Execution backend contract.
//!
//! The core never talks to a database directly. Every statement goes through a
//! [`Backend`] handle passed in explicitly by the caller.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{BackendError, Error};
use metaorm_proto::{Raw, Row};

/// A synchronous relational backend.
///
/// `execute` runs one statement with positional `?` bindings and returns every
/// row it produced (statements without a result set return an empty vector).
pub trait Backend {
    /// Execute a statement and return its rows.
    fn execute(&self, sql: &str, bindings: &[Raw]) -> Result<Vec<Row>, BackendError>;

    /// Open a transaction.
    fn begin(&self) -> Result<(), BackendError> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    /// Commit the open transaction.
    fn commit(&self) -> Result<(), BackendError> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    /// Roll back the open transaction.
    fn rollback(&self) -> Result<(), BackendError> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }
}

impl<B: Backend + ?Sized> Backend for &B {
    fn execute(&self, sql: &str, bindings: &[Raw]) -> Result<Vec<Row>, BackendError> {
        (**self).execute(sql, bindings)
    }

    fn begin(&self) -> Result<(), BackendError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), BackendError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), BackendError> {
        (**self).rollback()
    }
}

/// Run a statement, logging it first.
pub(crate) fn run(backend: &dyn Backend, sql: &str, bindings: &[Raw]) -> Result<Vec<Row>, Error> {
    debug!(sql = %sql, bindings = bindings.len(), "executing statement");
    Ok(backend.execute(sql, bindings)?)
}

/// Run `f` inside a transaction.
///
/// Commits when `f` succeeds, rolls back otherwise. A failed commit is
/// rolled back too, so the connection never stays inside the transaction. A
/// failed rollback is logged and the original error is returned.
pub fn transaction<T>(
    backend: &dyn Backend,
    f: impl FnOnce(&dyn Backend) -> Result<T, Error>,
) -> Result<T, Error> {
    backend.begin()?;
    let result = f(backend).and_then(|value| {
        backend.commit()?;
        Ok(value)
    });
    if result.is_err() {
        if let Err(rollback_err) = backend.rollback() {
            warn!(error = %rollback_err, "rollback failed");
        }
    }
    result
}

/// Backend wrapper that counts and records every statement.
///
/// Used to assert query bounds and to inspect what a component sent.
pub struct CountingBackend<B> {
    inner: B,
    count: AtomicUsize,
    statements: Mutex<Vec<String>>,
}

impl<B: Backend> CountingBackend<B> {
    /// Wrap a backend.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Number of statements executed since creation or the last reset.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Statements executed since creation or the last reset, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// Reset the counter and the statement log.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.statements.lock().clear();
    }

    /// Get the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: Backend> Backend for CountingBackend<B> {
    fn execute(&self, sql: &str, bindings: &[Raw]) -> Result<Vec<Row>, BackendError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().push(sql.to_string());
        self.inner.execute(sql, bindings)
    }
}
