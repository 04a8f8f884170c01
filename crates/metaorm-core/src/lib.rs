//! metaorm core - casts, catalog, entities, meta records and query execution.
//!
//! The crate maps relational rows to [`Entity`] values whose typed columns
//! and key-value meta records are read and written through declared casts.
//! It never opens a connection itself: every operation takes a [`Backend`].

pub mod backend;
pub mod cast;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod meta;
pub mod query;

pub use backend::{transaction, Backend, CountingBackend};
pub use cast::{Affinity, Cast, CastRegistry, CastSpec, FnCast};
pub use catalog::{
    Cardinality, Catalog, Discriminator, EntityDef, EntityModel, MetaCapable, MetaModel,
    MetaTableDef, PivotDef, RelationDef, SchemaBundle,
};
pub use entity::{Entity, Related};
pub use error::{BackendError, Error};
pub use meta::{MetaBridge, MetaCache};
pub use query::{
    CompiledQuery, EagerLoadPlanner, FanoutBudget, LoadNode, LoadPlan, QueryCompiler,
    QueryExecutor, ResultSet,
};

/// Re-export protocol types.
pub use metaorm_proto as proto;
