//! Core error types.

use thiserror::Error;

/// Failure reported by an execution backend.
///
/// The backend's message is kept verbatim for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend error: {message}")]
pub struct BackendError {
    /// Message as produced by the backend.
    pub message: String,
}

impl BackendError {
    /// Create a backend error from the backend's own message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Core mapping errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Value cannot be represented under the declared cast.
    #[error("cannot encode value with cast '{tag}': {reason}")]
    CastEncode { tag: String, reason: String },

    /// Raw value is malformed for the declared cast.
    #[error("cannot decode value with cast '{tag}': {reason}")]
    CastDecode { tag: String, reason: String },

    /// Cast tag is not registered.
    #[error("unknown cast kind: {0}")]
    UnknownCastKind(String),

    /// Entity type has no meta table mapping.
    #[error("entity type '{0}' has no meta table mapping")]
    MetaNotSupported(String),

    /// Operator outside the supported comparison set.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Relation name not declared on the entity type.
    #[error("unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    /// Entity type not registered in the catalog.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// Operation needs a persisted entity.
    #[error("entity '{0}' has not been persisted")]
    NotPersisted(String),

    /// A write was rejected; the entity's in-memory state is unchanged.
    #[error("persistence error on '{entity}': {reason}")]
    Persistence { entity: String, reason: String },

    /// Execution backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalid schema configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed query request.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Query exceeds the configured fanout budget.
    #[error("fanout budget exceeded: {0}")]
    BudgetExceeded(String),
}

impl Error {
    pub(crate) fn persistence(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Persistence {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

impl From<metaorm_proto::Error> for Error {
    fn from(err: metaorm_proto::Error) -> Self {
        match err {
            metaorm_proto::Error::UnsupportedOperator(op) => Error::UnsupportedOperator(op),
            metaorm_proto::Error::InvalidPath(path) => {
                Error::InvalidQuery(format!("invalid include path '{}'", path))
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
