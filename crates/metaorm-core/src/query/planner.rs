//! Eager-load planning.
//!
//! Include paths are parsed into a tree of load nodes: one node per distinct
//! relation per depth, shared prefixes merged, declared order preserved. The
//! loader issues exactly one query per node, so the query count of an eager
//! load depends on the shape of the includes and never on the number of
//! entities.

use std::sync::Arc;

use tracing::debug;

use super::join::load_nodes;
use crate::backend::Backend;
use crate::catalog::{Catalog, EntityModel, MetaCapable, RelationDef};
use crate::entity::Entity;
use crate::error::Error;
use metaorm_proto::{FilterExpr, RelationInclude, META_SEGMENT};

/// Budget limits for query execution to prevent runaway queries.
///
/// The default caps include depth only; root queries may return any number
/// of entities unless a cap is set with [`FanoutBudget::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutBudget {
    /// Maximum number of root entities a query may return.
    pub max_entities: usize,
    /// Maximum depth of relation includes.
    pub max_depth: usize,
}

impl Default for FanoutBudget {
    fn default() -> Self {
        Self {
            max_entities: usize::MAX,
            max_depth: 5,
        }
    }
}

impl FanoutBudget {
    /// Create a budget with custom limits.
    pub fn new(max_entities: usize, max_depth: usize) -> Self {
        Self {
            max_entities,
            max_depth,
        }
    }

    /// Create an unlimited budget (use with caution).
    pub fn unlimited() -> Self {
        Self {
            max_entities: usize::MAX,
            max_depth: usize::MAX,
        }
    }
}

/// One step of an eager load.
#[derive(Debug, Clone)]
pub enum LoadNode {
    /// Load a relation of the parent level.
    Relation(RelationNode),
    /// Preload meta records of the parent level; empty keys load every key.
    Meta { keys: Vec<String> },
}

/// A relation to load, with its own nested loads.
#[derive(Debug, Clone)]
pub struct RelationNode {
    /// Dot path from the root to this relation.
    pub path: String,
    /// Resolved relation.
    pub relation: RelationDef,
    /// Target model.
    pub target: Arc<EntityModel>,
    /// Per-include constraint, composed with the relation's own.
    pub filter: Option<FilterExpr>,
    /// Loads applied to the entities of this relation.
    pub children: Vec<LoadNode>,
}

/// A planned eager load rooted at one entity type.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    /// Root entity type.
    pub root_entity: String,
    /// Top-level nodes in declared order.
    pub nodes: Vec<LoadNode>,
}

impl LoadPlan {
    /// Number of queries a load issues when every level is non-empty.
    pub fn query_count(&self) -> usize {
        fn count(nodes: &[LoadNode]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    LoadNode::Relation(rel) => 1 + count(&rel.children),
                    LoadNode::Meta { .. } => 1,
                })
                .sum()
        }
        count(&self.nodes)
    }

    /// Whether there is nothing to load.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Plans and runs eager loads.
pub struct EagerLoadPlanner<'a> {
    catalog: &'a Catalog,
    backend: &'a dyn Backend,
    budget: FanoutBudget,
}

impl<'a> EagerLoadPlanner<'a> {
    /// Create a planner with the default budget.
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

    /// Parse include paths into a load plan.
    ///
    /// Every relation on every path is resolved here; an unknown relation
    /// fails with [`Error::UnknownRelation`] before any query runs.
    pub fn plan(&self, root: &EntityModel, includes: &[RelationInclude]) -> Result<LoadPlan, Error> {
        let mut nodes = Vec::new();
        for include in includes {
            let segments: Vec<&str> = include.segments().collect();
            if segments.iter().any(|s| s.trim().is_empty()) {
                return Err(metaorm_proto::Error::InvalidPath(include.path.clone()).into());
            }
            if segments.len() > self.budget.max_depth {
                return Err(Error::BudgetExceeded(format!(
                    "include path '{}' exceeds maximum depth {}",
                    include.path, self.budget.max_depth
                )));
            }
            if !include.is_meta() && !include.meta_keys.is_empty() {
                return Err(Error::InvalidQuery(format!(
                    "meta keys given for non-meta include '{}'",
                    include.path
                )));
            }
            self.insert(&mut nodes, root, &segments, "", include)?;
        }

        let plan = LoadPlan {
            root_entity: root.name().to_string(),
            nodes,
        };
        debug!(
            entity = %plan.root_entity,
            queries = plan.query_count(),
            "planned eager load"
        );
        Ok(plan)
    }

    fn insert(
        &self,
        nodes: &mut Vec<LoadNode>,
        model: &EntityModel,
        segments: &[&str],
        prefix: &str,
        include: &RelationInclude,
    ) -> Result<(), Error> {
        let Some((&segment, rest)) = segments.split_first() else {
            return Ok(());
        };

        if segment == META_SEGMENT {
            if !rest.is_empty() {
                return Err(Error::InvalidQuery(format!(
                    "'{}' must be the last segment of '{}'",
                    META_SEGMENT, include.path
                )));
            }
            if include.filter.is_some() {
                return Err(Error::InvalidQuery(format!(
                    "filters do not apply to meta include '{}'",
                    include.path
                )));
            }
            model.require_meta()?;
            merge_meta(nodes, &include.meta_keys);
            return Ok(());
        }

        let relation = model.relation(segment)?;
        let path = if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", prefix, segment)
        };

        let position = nodes.iter().position(
            |node| matches!(node, LoadNode::Relation(rel) if rel.relation.name == segment),
        );
        let index = match position {
            Some(index) => index,
            None => {
                nodes.push(LoadNode::Relation(RelationNode {
                    path: path.clone(),
                    relation: relation.clone(),
                    target: self.catalog.model(&relation.target)?,
                    filter: None,
                    children: Vec::new(),
                }));
                nodes.len() - 1
            }
        };
        let node = match &mut nodes[index] {
            LoadNode::Relation(node) => node,
            LoadNode::Meta { .. } => {
                return Err(Error::InvalidQuery(format!("malformed include '{}'", path)))
            }
        };

        if rest.is_empty() {
            if let Some(filter) = &include.filter {
                match &node.filter {
                    Some(existing) if existing != filter => {
                        return Err(Error::InvalidQuery(format!(
                            "conflicting filters for include '{}'",
                            path
                        )));
                    }
                    _ => node.filter = Some(filter.clone()),
                }
            }
            return Ok(());
        }

        let target = Arc::clone(&node.target);
        self.insert(&mut node.children, &target, rest, &path, include)
    }

    /// Load a plan onto root entities.
    pub fn load(&self, entities: &mut [Entity], plan: &LoadPlan) -> Result<(), Error> {
        if let Some(other) = entities.iter().find(|e| e.entity_name() != plan.root_entity) {
            return Err(Error::InvalidQuery(format!(
                "plan for '{}' applied to '{}'",
                plan.root_entity,
                other.entity_name()
            )));
        }
        load_nodes(self.backend, &plan.nodes, entities)
    }

    /// Plan and load in one step.
    pub fn include(
        &self,
        entities: &mut [Entity],
        includes: &[RelationInclude],
    ) -> Result<(), Error> {
        let Some(first) = entities.first() else {
            return Ok(());
        };
        let model = Arc::clone(first.model());
        let plan = self.plan(&model, includes)?;
        self.load(entities, &plan)
    }
}

fn merge_meta(nodes: &mut Vec<LoadNode>, keys: &[String]) {
    for node in nodes.iter_mut() {
        if let LoadNode::Meta { keys: existing } = node {
            if existing.is_empty() || keys.is_empty() {
                existing.clear();
            } else {
                for key in keys {
                    if !existing.contains(key) {
                        existing.push(key.clone());
                    }
                }
            }
            return;
        }
    }
    nodes.push(LoadNode::Meta {
        keys: keys.to_vec(),
    });
}
