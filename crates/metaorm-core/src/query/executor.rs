//! Query executor that ties compilation, execution and eager loading together.

use tracing::{debug, instrument};

use super::compiler::{CompiledQuery, QueryCompiler};
use super::planner::{EagerLoadPlanner, FanoutBudget};
use crate::backend::{run, Backend};
use crate::catalog::{Catalog, MetaCapable};
use crate::entity::Entity;
use crate::error::Error;
use metaorm_proto::{EntityQuery, FilterExpr, Identifier, Pagination, Value};

/// Entities returned by a query, in result order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    entities: Vec<Entity>,
}

impl ResultSet {
    /// Number of root entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the query matched nothing.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// First entity, if any.
    pub fn first(&self) -> Option<&Entity> {
        self.entities.first()
    }

    /// Iterate over the entities.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    /// Entities as a slice.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Entities as a mutable slice, e.g. for a later [`crate::MetaBridge::preload`].
    pub fn entities_mut(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    /// Take the entities.
    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }
}

impl IntoIterator for ResultSet {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'r> IntoIterator for &'r ResultSet {
    type Item = &'r Entity;
    type IntoIter = std::slice::Iter<'r, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

/// Query executor.
pub struct QueryExecutor<'a> {
    catalog: &'a Catalog,
    backend: &'a dyn Backend,
    budget: FanoutBudget,
}

impl<'a> QueryExecutor<'a> {
    /// Create a new executor with the default budget: includes up to five
    /// levels deep, no cap on root entities.
    pub fn new(catalog: &'a Catalog, backend: &'a dyn Backend) -> Self {
        Self {
            catalog,
            backend,
            budget: FanoutBudget::default(),
        }
    }

    /// Use a custom budget.
    pub fn with_budget(mut self, budget: FanoutBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Compile the root statement of a query without running it.
    pub fn compile(&self, query: &EntityQuery) -> Result<CompiledQuery, Error> {
        let model = self.catalog.model(&query.root_entity)?;
        let mut compiler = QueryCompiler::new(&model);

        if !query.default_filters {
            compiler.without_default_filters();
        }
        if let Some(filter) = &query.filter {
            compiler.add_filter(filter)?;
        }
        for filter in &query.meta_filters {
            compiler.add_meta_filter(&filter.key, &filter.operator, filter.value.clone())?;
        }
        for projection in &query.meta_projections {
            compiler.add_meta_projection(&projection.alias, &projection.key)?;
        }
        for order in &query.order_by {
            compiler.order_by(order);
        }
        if let Some(pagination) = &query.pagination {
            compiler.paginate(pagination.clone());
        }

        compiler.compile()
    }

    /// Execute a query: the root statement, then one statement per include
    /// node.
    ///
    /// Includes and filters are validated before anything is sent to the
    /// backend.
    #[instrument(skip_all, fields(entity = %query.root_entity))]
    pub fn execute(&self, query: &EntityQuery) -> Result<ResultSet, Error> {
        let model = self.catalog.model(&query.root_entity)?;
        let planner =
            EagerLoadPlanner::new(self.catalog, self.backend).with_budget(self.budget.clone());
        let plan = planner.plan(&model, &query.includes)?;
        let compiled = self.compile(query)?;

        let rows = run(self.backend, &compiled.sql, &compiled.bindings)?;
        if rows.len() > self.budget.max_entities {
            return Err(Error::BudgetExceeded(format!(
                "query returned {} '{}' entities, limit is {}",
                rows.len(),
                model.name(),
                self.budget.max_entities
            )));
        }

        let mut entities = Vec::with_capacity(rows.len());
        for mut row in rows {
            let mut projected = Vec::with_capacity(compiled.projections.len());
            for projection in &compiled.projections {
                let raw = row.take(&projection.column);
                let value = match (raw, model.meta_model()) {
                    (Some(raw), Some(meta)) => meta.cast_for(&projection.key).decode(&raw)?,
                    _ => None,
                };
                projected.push((projection.alias.as_str(), value));
            }

            let mut entity = Entity::from_row(model.clone(), row)?;
            for (alias, value) in projected {
                entity.push_projection(alias, value);
            }
            entities.push(entity);
        }
        debug!(rows = entities.len(), "root entities materialized");

        planner.load(&mut entities, &plan)?;
        Ok(ResultSet { entities })
    }

    /// Fetch one entity by primary key, honoring default filters.
    pub fn find(&self, entity: &str, id: impl Into<Identifier>) -> Result<Option<Entity>, Error> {
        let model = self.catalog.model(entity)?;
        let value = match id.into() {
            Identifier::Int(i) => Value::Int(i),
            Identifier::Text(s) => Value::String(s),
        };
        let query = EntityQuery::new(entity)
            .with_filter(FilterExpr::eq(model.primary_key(), value))
            .with_pagination(Pagination::limit(1));
        Ok(self.execute(&query)?.into_iter().next())
    }
}
