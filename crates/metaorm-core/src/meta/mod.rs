//! Key-value meta records attached to entities.
//!
//! Meta-capable entity types own a side table of `(owner, key, value)`
//! records. Several records may share an owner and key; the one with the
//! lowest record id is the one read and the one updated.

mod bridge;
mod cache;

pub use bridge::MetaBridge;
pub use cache::MetaCache;
