//! Compiles entity queries with meta filters into SQL.
//!
//! Each distinct meta key used in a filter gets one inner join on the meta
//! table (`mt1`, `mt2`, ...); filters on the same key share its join. Meta
//! projections are correlated subqueries so they never multiply rows.

use tracing::trace;

use super::sql::{comparable, placeholders, qualified, quote_ident, render_filter};
use crate::catalog::{EntityModel, MetaCapable};
use crate::error::Error;
use metaorm_proto::{FilterExpr, Operator, OrderDirection, OrderSpec, Pagination, Raw, Value};

/// Alias of the base table in compiled statements.
pub const ROOT_ALIAS: &str = "t";

/// A meta value selected as an extra result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    /// Alias requested by the caller.
    pub alias: String,
    /// Meta key.
    pub key: String,
    /// Result column carrying the raw value.
    pub column: String,
}

/// A compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text with positional `?` placeholders.
    pub sql: String,
    /// Bindings in placeholder order.
    pub bindings: Vec<Raw>,
    /// Meta projections present in the result rows.
    pub projections: Vec<ProjectedColumn>,
}

#[derive(Debug)]
struct MetaJoin {
    key: String,
    alias: String,
    sql: String,
}

#[derive(Debug)]
struct Condition {
    sql: String,
    bindings: Vec<Raw>,
}

/// Incremental builder for one root query.
///
/// Every `add_*` call validates its input immediately; errors surface before
/// any SQL is produced. Compilation is deterministic for a given call order.
#[derive(Debug)]
pub struct QueryCompiler<'m> {
    model: &'m EntityModel,
    joins: Vec<MetaJoin>,
    projections: Vec<ProjectedColumn>,
    conditions: Vec<Condition>,
    order: Vec<String>,
    pagination: Option<Pagination>,
    default_filters: bool,
}

impl<'m> QueryCompiler<'m> {
    /// Start a query over an entity type.
    pub fn new(model: &'m EntityModel) -> Self {
        Self {
            model,
            joins: Vec::new(),
            projections: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            pagination: None,
            default_filters: true,
        }
    }

    /// The model being queried.
    pub fn model(&self) -> &'m EntityModel {
        self.model
    }

    /// Add a filter over fixed columns.
    pub fn add_filter(&mut self, filter: &FilterExpr) -> Result<&mut Self, Error> {
        let mut bindings = Vec::new();
        let sql = render_filter(filter, ROOT_ALIAS, self.model, &mut bindings)?;
        self.conditions.push(Condition { sql, bindings });
        Ok(self)
    }

    /// Add a meta filter with the operator in written form.
    ///
    /// Fails with [`Error::UnsupportedOperator`] for anything outside
    /// `=, !=, <>, >, >=, <, <=, LIKE`.
    pub fn add_meta_filter(
        &mut self,
        key: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, Error> {
        let operator: Operator = operator.parse()?;
        self.add_meta_filter_op(key, operator, &value.into())
    }

    /// Add a meta filter.
    ///
    /// The value is encoded with the key's cast. Numeric casts compare through
    /// `CAST(... AS INTEGER|REAL)`; `LIKE` always compares text. `=` and `!=`
    /// on a cast with several stored spellings (booleans) match any of them.
    pub fn add_meta_filter_op(
        &mut self,
        key: &str,
        operator: Operator,
        value: &Value,
    ) -> Result<&mut Self, Error> {
        let model = self.model;
        let meta = model.require_meta()?;
        let cast = meta.cast_for(key);

        let (lhs, raw) = match operator {
            Operator::Like => {
                let pattern = match value {
                    Value::String(s) => s.clone(),
                    other => cast
                        .encode(other)?
                        .as_text()
                        .map(|t| t.into_owned())
                        .unwrap_or_default(),
                };
                (None, Raw::Text(pattern))
            }
            _ => (Some(cast.affinity()), cast.encode(value)?),
        };

        let forms = match operator {
            Operator::Eq | Operator::Ne => cast.equality_forms(&raw),
            _ => None,
        };

        let alias = self.join_alias(key)?;
        let column = qualified(&alias, meta.value_column());
        if let Some(forms) = forms {
            let negation = if operator == Operator::Ne { "NOT " } else { "" };
            self.conditions.push(Condition {
                sql: format!(
                    "LOWER(TRIM({})) {}IN ({})",
                    column,
                    negation,
                    placeholders(forms.len())
                ),
                bindings: forms.into_iter().map(Raw::Text).collect(),
            });
            return Ok(self);
        }
        let lhs = match lhs {
            Some(affinity) => comparable(&column, affinity),
            None => column,
        };
        self.conditions.push(Condition {
            sql: format!("{} {} ?", lhs, operator.as_sql()),
            bindings: vec![raw],
        });
        Ok(self)
    }

    /// Require a record for the key to exist.
    pub fn add_meta_exists(&mut self, key: &str) -> Result<&mut Self, Error> {
        self.join_alias(key)?;
        Ok(self)
    }

    fn join_alias(&mut self, key: &str) -> Result<String, Error> {
        if let Some(join) = self.joins.iter().find(|j| j.key == key) {
            return Ok(join.alias.clone());
        }
        let meta = self.model.require_meta()?;
        let alias = format!("mt{}", self.joins.len() + 1);
        let sql = format!(
            "INNER JOIN {} {} ON {} = {} AND {} = ?",
            quote_ident(meta.table()),
            alias,
            qualified(&alias, meta.owner_column()),
            qualified(ROOT_ALIAS, self.model.primary_key()),
            qualified(&alias, meta.key_column())
        );
        self.joins.push(MetaJoin {
            key: key.to_string(),
            alias: alias.clone(),
            sql,
        });
        trace!(key, alias = %alias, "allocated meta join");
        Ok(alias)
    }

    /// Surface the first record of a meta key as a result column.
    pub fn add_meta_projection(&mut self, alias: &str, key: &str) -> Result<&mut Self, Error> {
        self.model.require_meta()?;
        if self.projections.iter().any(|p| p.alias == alias) {
            return Err(Error::InvalidQuery(format!(
                "meta projection alias '{}' used twice",
                alias
            )));
        }
        self.projections.push(ProjectedColumn {
            alias: alias.to_string(),
            key: key.to_string(),
            column: format!("__meta_{}", self.projections.len()),
        });
        Ok(self)
    }

    /// Order by a column or a meta projection alias.
    pub fn order_by(&mut self, order: &OrderSpec) -> &mut Self {
        let target = match self.projections.iter().find(|p| p.alias == order.field) {
            Some(projection) => quote_ident(&projection.column),
            None => qualified(ROOT_ALIAS, &order.field),
        };
        let direction = match order.direction {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        };
        self.order.push(format!("{} {}", target, direction));
        self
    }

    /// Limit and offset the result.
    pub fn paginate(&mut self, pagination: Pagination) -> &mut Self {
        self.pagination = Some(pagination);
        self
    }

    /// Skip the entity type's discriminator and default filters.
    pub fn without_default_filters(&mut self) -> &mut Self {
        self.default_filters = false;
        self
    }

    /// Whether at least one meta join is present.
    pub fn has_meta_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// Produce the statement.
    pub fn compile(&self) -> Result<CompiledQuery, Error> {
        let mut bindings = Vec::new();
        let mut sql = String::from("SELECT ");
        if self.has_meta_joins() {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(ROOT_ALIAS);
        sql.push_str(".*");

        for (i, projection) in self.projections.iter().enumerate() {
            let meta = self.model.require_meta()?;
            let pm = format!("pm{}", i);
            sql.push_str(&format!(
                ", (SELECT {} FROM {} {} WHERE {} = {} AND {} = ? ORDER BY {} ASC LIMIT 1) AS {}",
                qualified(&pm, meta.value_column()),
                quote_ident(meta.table()),
                pm,
                qualified(&pm, meta.owner_column()),
                qualified(ROOT_ALIAS, self.model.primary_key()),
                qualified(&pm, meta.key_column()),
                qualified(&pm, meta.id_column()),
                quote_ident(&projection.column)
            ));
            bindings.push(Raw::Text(projection.key.clone()));
        }

        sql.push_str(&format!(
            " FROM {} {}",
            quote_ident(self.model.table()),
            ROOT_ALIAS
        ));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.sql);
            bindings.push(Raw::Text(join.key.clone()));
        }

        let mut clauses = Vec::new();
        if self.default_filters {
            if let Some(filter) = self.model.default_filter() {
                clauses.push(render_filter(&filter, ROOT_ALIAS, self.model, &mut bindings)?);
            }
        }
        for condition in &self.conditions {
            clauses.push(condition.sql.clone());
            bindings.extend(condition.bindings.iter().cloned());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }

        if let Some(pagination) = &self.pagination {
            sql.push_str(&format!(" LIMIT {}", pagination.limit));
            if pagination.offset > 0 {
                sql.push_str(&format!(" OFFSET {}", pagination.offset));
            }
        }

        Ok(CompiledQuery {
            sql,
            bindings,
            projections: self.projections.clone(),
        })
    }
}
