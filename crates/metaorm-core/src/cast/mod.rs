//! Typed casts between raw column values and [`Value`]s.
//!
//! A cast is a bidirectional transform declared per column or meta key. The
//! [`CastRegistry`] maps tags (`"integer"`, `"boolean"`, ...) to casts; entity
//! models resolve their declarations against it once, at registration.

mod builtin;
mod registry;

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use metaorm_proto::{Raw, Value};

pub use builtin::{
    ArrayCast, BooleanCast, DateCast, DateTimeCast, FloatCast, IntegerCast, JsonCast, RawCast,
    StringCast, TextCast,
};
pub use registry::CastRegistry;

/// How a cast's raw values compare inside SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// Compare as text.
    Text,
    /// Compare as integers.
    Integer,
    /// Compare as floating point numbers.
    Real,
}

impl Affinity {
    /// SQL type name used in `CAST(... AS <type>)`, if the affinity needs one.
    pub fn sql_type(&self) -> Option<&'static str> {
        match self {
            Affinity::Text => None,
            Affinity::Integer => Some("INTEGER"),
            Affinity::Real => Some("REAL"),
        }
    }
}

/// A bidirectional transform between [`Value`] and [`Raw`].
///
/// Implementations report failures as a plain reason; [`CastSpec`] attaches
/// the tag and turns them into [`Error::CastEncode`] / [`Error::CastDecode`].
/// `decode` is never called with [`Raw::Null`].
pub trait Cast: Send + Sync {
    /// Encode a value for storage.
    fn encode(&self, value: &Value) -> Result<Raw, String>;

    /// Decode a non-NULL stored value.
    fn decode(&self, raw: &Raw) -> Result<Value, String>;

    /// Comparison affinity for compiled predicates.
    fn affinity(&self) -> Affinity {
        Affinity::Text
    }

    /// Every stored text form equal to an encoded value, lowercased.
    ///
    /// When this returns `Some`, `=` and `!=` predicates compare the trimmed,
    /// lowercased stored text against these forms instead of comparing by
    /// affinity.
    fn equality_forms(&self, _raw: &Raw) -> Option<Vec<String>> {
        None
    }
}

/// Cast built from a pair of functions.
pub struct FnCast<E, D> {
    encode: E,
    decode: D,
    affinity: Affinity,
}

impl<E, D> FnCast<E, D>
where
    E: Fn(&Value) -> Result<Raw, String> + Send + Sync,
    D: Fn(&Raw) -> Result<Value, String> + Send + Sync,
{
    /// Create a text-affinity cast from encode/decode functions.
    pub fn new(encode: E, decode: D) -> Self {
        Self {
            encode,
            decode,
            affinity: Affinity::Text,
        }
    }

    /// Set the comparison affinity.
    pub fn with_affinity(mut self, affinity: Affinity) -> Self {
        self.affinity = affinity;
        self
    }
}

impl<E, D> Cast for FnCast<E, D>
where
    E: Fn(&Value) -> Result<Raw, String> + Send + Sync,
    D: Fn(&Raw) -> Result<Value, String> + Send + Sync,
{
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        (self.encode)(value)
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        (self.decode)(raw)
    }

    fn affinity(&self) -> Affinity {
        self.affinity
    }
}

/// A resolved cast, tagged with the name it was registered under.
#[derive(Clone)]
pub struct CastSpec {
    tag: Arc<str>,
    cast: Arc<dyn Cast>,
}

impl CastSpec {
    /// Create a spec from a tag and a cast.
    pub fn new(tag: impl AsRef<str>, cast: Arc<dyn Cast>) -> Self {
        Self {
            tag: Arc::from(tag.as_ref()),
            cast,
        }
    }

    /// The tag this cast is registered under.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Comparison affinity.
    pub fn affinity(&self) -> Affinity {
        self.cast.affinity()
    }

    /// Stored text forms equal to `raw`, see [`Cast::equality_forms`].
    pub fn equality_forms(&self, raw: &Raw) -> Option<Vec<String>> {
        self.cast.equality_forms(raw)
    }

    /// Encode a value, failing with [`Error::CastEncode`].
    pub fn encode(&self, value: &Value) -> Result<Raw, Error> {
        self.cast.encode(value).map_err(|reason| Error::CastEncode {
            tag: self.tag.to_string(),
            reason,
        })
    }

    /// Decode a raw value. NULL yields `None` without invoking the cast.
    pub fn decode(&self, raw: &Raw) -> Result<Option<Value>, Error> {
        if raw.is_null() {
            return Ok(None);
        }
        self.cast
            .decode(raw)
            .map(Some)
            .map_err(|reason| Error::CastDecode {
                tag: self.tag.to_string(),
                reason,
            })
    }
}

impl fmt::Debug for CastSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastSpec")
            .field("tag", &self.tag)
            .field("affinity", &self.affinity())
            .finish()
    }
}
