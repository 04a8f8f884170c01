//! Raw column values, result rows, and record identifiers.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A raw value as stored in (or bound to) a relational column.
///
/// The variants mirror the storage classes a relational backend hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Raw {
    /// SQL NULL.
    Null,
    /// Integer storage.
    Integer(i64),
    /// Floating point storage.
    Real(f64),
    /// Text storage.
    Text(String),
}

impl Raw {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Raw::Null)
    }

    /// Textual form of the value, `None` for NULL.
    ///
    /// Numeric storage is rendered the way a text column would hold it.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Raw::Null => None,
            Raw::Integer(i) => Some(Cow::Owned(i.to_string())),
            Raw::Real(f) => Some(Cow::Owned(f.to_string())),
            Raw::Text(s) => Some(Cow::Borrowed(s)),
        }
    }

    /// Try to get as i64. Text holding an integer literal is accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Raw::Integer(i) => Some(*i),
            Raw::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<i64> for Raw {
    fn from(v: i64) -> Self {
        Raw::Integer(v)
    }
}

impl From<f64> for Raw {
    fn from(v: f64) -> Self {
        Raw::Real(v)
    }
}

impl From<String> for Raw {
    fn from(v: String) -> Self {
        Raw::Text(v)
    }
}

impl From<&str> for Raw {
    fn from(v: &str) -> Self {
        Raw::Text(v.to_string())
    }
}

impl<T: Into<Raw>> From<Option<T>> for Raw {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Raw::Null,
        }
    }
}

/// Primary or foreign key value of a record.
///
/// Unlike [`Raw`], identifiers are hashable so result sets can be grouped by
/// key when relations are attached to their owners.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identifier {
    /// Integer key (auto-increment style).
    Int(i64),
    /// Text key (slug, UUID string, ...).
    Text(String),
}

impl Identifier {
    /// Build an identifier from a raw column value.
    ///
    /// NULL and floating point values are not usable as keys. Text holding an
    /// integer literal normalizes to [`Identifier::Int`] so that keys compare
    /// equal regardless of the column affinity they were read from.
    pub fn from_raw(raw: &Raw) -> Option<Self> {
        match raw {
            Raw::Integer(i) => Some(Identifier::Int(*i)),
            Raw::Text(s) => match s.parse::<i64>() {
                Ok(i) if i.to_string() == *s => Some(Identifier::Int(i)),
                _ => Some(Identifier::Text(s.clone())),
            },
            Raw::Null | Raw::Real(_) => None,
        }
    }

    /// Convert back into a bindable raw value.
    pub fn to_raw(&self) -> Raw {
        match self {
            Identifier::Int(i) => Raw::Integer(*i),
            Identifier::Text(s) => Raw::Text(s.clone()),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(i) => write!(f, "{}", i),
            Identifier::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Identifier {
    fn from(v: i64) -> Self {
        Identifier::Int(v)
    }
}

impl From<&str> for Identifier {
    fn from(v: &str) -> Self {
        Identifier::Text(v.to_string())
    }
}

/// A result row: ordered column name to raw value pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Raw)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a row from column pairs.
    pub fn from_columns(columns: Vec<(String, Raw)>) -> Self {
        Self { columns }
    }

    /// Append a column.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Raw>) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    /// Push a column in place.
    pub fn push(&mut self, name: impl Into<String>, value: Raw) {
        self.columns.push((name.into(), value));
    }

    /// Get a column value by name (first match).
    pub fn get(&self, name: &str) -> Option<&Raw> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Remove a column by name and return its value.
    pub fn take(&mut self, name: &str) -> Option<Raw> {
        let pos = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(pos).1)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over column pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raw)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Consume into column pairs.
    pub fn into_columns(self) -> Vec<(String, Raw)> {
        self.columns
    }
}
