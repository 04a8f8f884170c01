//! Query IR types for entity queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::Value;

/// Comparison operator usable in meta filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `LIKE`
    Like,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Like => "LIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            other if other.eq_ignore_ascii_case("like") => Ok(Operator::Like),
            other => Err(Error::UnsupportedOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Filter expression over fixed columns of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equals value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null.
    IsNull { field: String },
    /// Field is not null.
    IsNotNull { field: String },
    /// Field matches a LIKE pattern.
    Like { field: String, pattern: String },
    /// Field does not match a LIKE pattern.
    NotLike { field: String, pattern: String },
    /// All conditions must be true.
    And(Vec<FilterExpr>),
    /// At least one condition must be true.
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an IN filter.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values,
        }
    }

    /// Create a NOT IN filter.
    pub fn not_in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Create an IS NULL filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            field: field.into(),
        }
    }

    /// Create an IS NOT NULL filter.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNotNull {
            field: field.into(),
        }
    }

    /// Create a LIKE filter.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a NOT LIKE filter.
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::NotLike {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<FilterExpr>) -> Self {
        FilterExpr::And(filters)
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(filters)
    }

    /// Build a comparison from an operator.
    pub fn compare(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        let field = field.into();
        let value = value.into();
        match op {
            Operator::Eq => FilterExpr::Eq { field, value },
            Operator::Ne => FilterExpr::Ne { field, value },
            Operator::Gt => FilterExpr::Gt { field, value },
            Operator::Ge => FilterExpr::Ge { field, value },
            Operator::Lt => FilterExpr::Lt { field, value },
            Operator::Le => FilterExpr::Le { field, value },
            Operator::Like => FilterExpr::Like {
                field,
                pattern: match value {
                    Value::String(s) => s,
                    Value::Int(i) => i.to_string(),
                    Value::Float(f) => f.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => serde_json::to_string(&other).unwrap_or_default(),
                },
            },
        }
    }

    /// Combine two filters with AND, flattening nested conjunctions.
    pub fn and_with(self, other: FilterExpr) -> Self {
        match (self, other) {
            (FilterExpr::And(mut left), FilterExpr::And(right)) => {
                left.extend(right);
                FilterExpr::And(left)
            }
            (FilterExpr::And(mut left), right) => {
                left.push(right);
                FilterExpr::And(left)
            }
            (left, FilterExpr::And(mut right)) => {
                right.insert(0, left);
                FilterExpr::And(right)
            }
            (left, right) => FilterExpr::And(vec![left, right]),
        }
    }
}

/// A filter on a meta key, as requested by the caller.
///
/// The operator is kept in its written form and validated when the query is
/// compiled, before any statement reaches the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFilter {
    /// Meta key.
    pub key: String,
    /// Operator as written (`=`, `>=`, `LIKE`, ...).
    pub operator: String,
    /// Value compared against the encoded meta value.
    pub value: Value,
}

/// A meta value surfaced as a column of the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaProjection {
    /// Name the value is exposed under on the materialized entity.
    pub alias: String,
    /// Meta key.
    pub key: String,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Ordering specification.
///
/// `field` names either a column or a meta projection alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Column or projection alias to sort by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create ascending order.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create descending order.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Pagination parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of results to return.
    pub limit: u32,
    /// Number of results to skip.
    pub offset: u32,
}

impl Pagination {
    /// Create pagination with limit and offset.
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Create pagination with just a limit.
    pub fn limit(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }
}

/// Reserved include segment that loads meta records instead of a relation.
pub const META_SEGMENT: &str = "meta";

/// An eager-loaded relation path.
///
/// The `path` uses dot-notation for nested relations:
/// - "comments" - include comments of the root entities
/// - "comments.user" - include the user of every loaded comment
/// - "comments.meta" - preload the meta records of every loaded comment
///
/// `filter` and `meta_keys` apply to the last segment only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationInclude {
    /// Dot-separated path to this relation.
    pub path: String,
    /// Optional constraint for the related entities.
    pub filter: Option<FilterExpr>,
    /// Meta keys to preload when the last segment is `meta` (empty = all).
    pub meta_keys: Vec<String>,
}

impl RelationInclude {
    /// Create a new include for a relation path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filter: None,
            meta_keys: vec![],
        }
    }

    /// Set a constraint for this include.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Restrict a meta include to the given keys.
    pub fn with_meta_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }

    /// Get the relation name (last segment of the path).
    pub fn relation_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// Get the depth of this include (number of dots + 1).
    pub fn depth(&self) -> usize {
        self.path.matches('.').count() + 1
    }

    /// Check if this include targets meta records.
    pub fn is_meta(&self) -> bool {
        self.relation_name() == META_SEGMENT
    }
}

/// A query over one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    /// The entity type to query.
    pub root_entity: String,
    /// Optional filter over fixed columns.
    pub filter: Option<FilterExpr>,
    /// Meta filters, AND-combined.
    pub meta_filters: Vec<MetaFilter>,
    /// Meta values to surface on each result.
    pub meta_projections: Vec<MetaProjection>,
    /// Flat list of relation includes (nested relations use dot-notation paths).
    pub includes: Vec<RelationInclude>,
    /// Ordering specification.
    pub order_by: Vec<OrderSpec>,
    /// Pagination parameters.
    pub pagination: Option<Pagination>,
    /// Whether the entity type's default filters apply.
    pub default_filters: bool,
}

impl EntityQuery {
    /// Create a new query for an entity type.
    pub fn new(root_entity: impl Into<String>) -> Self {
        Self {
            root_entity: root_entity.into(),
            filter: None,
            meta_filters: vec![],
            meta_projections: vec![],
            includes: vec![],
            order_by: vec![],
            pagination: None,
            default_filters: true,
        }
    }

    /// Add a column filter, AND-combined with any existing one.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_with(filter),
            None => filter,
        });
        self
    }

    /// Add a meta filter.
    pub fn where_meta(
        mut self,
        key: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.meta_filters.push(MetaFilter {
            key: key.into(),
            operator: operator.into(),
            value: value.into(),
        });
        self
    }

    /// Surface a meta value under an alias.
    pub fn select_meta(mut self, alias: impl Into<String>, key: impl Into<String>) -> Self {
        self.meta_projections.push(MetaProjection {
            alias: alias.into(),
            key: key.into(),
        });
        self
    }

    /// Add a relation include.
    pub fn include(mut self, include: RelationInclude) -> Self {
        self.includes.push(include);
        self
    }

    /// Add ordering.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set pagination.
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Skip the entity type's default filters.
    pub fn without_default_filters(mut self) -> Self {
        self.default_filters = false;
        self
    }
}
