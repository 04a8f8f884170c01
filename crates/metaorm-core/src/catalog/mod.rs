//! Entity catalog.
//!
//! Definitions ([`EntityDef`], [`RelationDef`], [`MetaTableDef`]) describe the
//! mapping as configured; the [`Catalog`] resolves them into shared
//! [`EntityModel`]s.

mod catalog;
mod entity;
mod model;
mod relation;
mod schema;

pub use catalog::Catalog;
pub use entity::{Discriminator, EntityDef, MetaTableDef};
pub use model::{EntityModel, MetaCapable, MetaModel};
pub use relation::{Cardinality, PivotDef, RelationDef};
pub use schema::SchemaBundle;
