//! metaorm protocol types.
//!
//! This crate defines the value and query IR types shared by the mapping core
//! and its execution backends.
//!
//! # Modules
//!
//! - [`value`] - Typed values read from and written to entities
//! - [`raw`] - Raw column values, result rows, and record identifiers
//! - [`query`] - Query IR: column filters, meta filters, projections, includes
//! - [`error`] - Protocol error types

pub mod error;
pub mod query;
pub mod raw;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use query::{
    EntityQuery, FilterExpr, MetaFilter, MetaProjection, Operator, OrderDirection, OrderSpec,
    Pagination, RelationInclude, META_SEGMENT,
};
pub use raw::{Identifier, Raw, Row};
pub use value::Value;
