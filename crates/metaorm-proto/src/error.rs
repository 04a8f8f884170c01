//! Protocol error types.

use thiserror::Error;

/// Errors raised while building query IR.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Operator outside the supported comparison set.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Malformed include path.
    #[error("invalid include path: {0}")]
    InvalidPath(String),
}
