//! Eager-load execution.
//!
//! Each relation node runs one batched query for all parents of its level
//! and attaches results with a hash join:
//! 1. Build phase: group child rows by the key that links them to a parent.
//! 2. Probe phase: look every parent's local key up in the groups.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use super::compiler::ROOT_ALIAS;
use super::planner::{LoadNode, RelationNode};
use super::sql::{placeholders, qualified, quote_ident, render_filter};
use crate::backend::{run, Backend};
use crate::entity::{Entity, Related};
use crate::error::Error;
use crate::meta::MetaBridge;
use metaorm_proto::{Identifier, Raw};

/// Result column carrying the owner key of pivot-joined rows.
const OWNER_COLUMN: &str = "__owner";

/// Run load nodes against one level of parents, in declared order.
pub(crate) fn load_nodes(
    backend: &dyn Backend,
    nodes: &[LoadNode],
    parents: &mut [Entity],
) -> Result<(), Error> {
    for node in nodes {
        match node {
            LoadNode::Relation(relation) => load_relation(backend, relation, parents)?,
            LoadNode::Meta { keys } => MetaBridge::new(backend).preload(parents, keys)?,
        }
    }
    Ok(())
}

#[instrument(skip_all, fields(relation = %node.path, parents = parents.len()))]
fn load_relation(
    backend: &dyn Backend,
    node: &RelationNode,
    parents: &mut [Entity],
) -> Result<(), Error> {
    let relation = &node.relation;

    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    for parent in parents.iter() {
        if let Some(key) = parent.raw(&relation.local_key).and_then(Identifier::from_raw) {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }

    if keys.is_empty() {
        debug!("no parent keys, skipping query");
        for parent in parents.iter_mut() {
            parent.attach(&relation.name, empty(relation.is_single()));
        }
        return Ok(());
    }

    let (sql, bindings) = relation_query(node, &keys)?;
    let rows = run(backend, &sql, &bindings)?;

    let mut links = Vec::with_capacity(rows.len());
    let mut children = Vec::with_capacity(rows.len());
    for mut row in rows {
        let link = match &relation.pivot {
            Some(_) => row.take(OWNER_COLUMN),
            None => row.get(&relation.foreign_key).cloned(),
        };
        let Some(link) = link.as_ref().and_then(Identifier::from_raw) else {
            continue;
        };
        links.push(link);
        children.push(Entity::from_row(node.target.clone(), row)?);
    }
    debug!(rows = children.len(), "relation loaded");

    // Nested loads see every child of this level at once.
    load_nodes(backend, &node.children, &mut children)?;

    // Build phase
    let mut groups: HashMap<Identifier, Vec<Entity>> = HashMap::new();
    for (link, child) in links.into_iter().zip(children) {
        groups.entry(link).or_default().push(child);
    }

    // Probe phase
    for parent in parents.iter_mut() {
        let group = parent
            .raw(&relation.local_key)
            .and_then(Identifier::from_raw)
            .and_then(|key| groups.get(&key));
        let related = match (group, relation.is_single()) {
            (Some(group), true) => Related::One(group.first().cloned().map(Box::new)),
            (Some(group), false) => Related::Many(group.clone()),
            (None, single) => empty(single),
        };
        parent.attach(&relation.name, related);
    }
    Ok(())
}

fn empty(single: bool) -> Related {
    if single {
        Related::One(None)
    } else {
        Related::Many(Vec::new())
    }
}

fn relation_query(node: &RelationNode, keys: &[Identifier]) -> Result<(String, Vec<Raw>), Error> {
    let relation = &node.relation;
    let target = &node.target;
    let mut bindings: Vec<Raw> = keys.iter().map(Identifier::to_raw).collect();

    let mut sql = match &relation.pivot {
        Some(pivot) => format!(
            "SELECT {}.*, p.{} AS {} FROM {} {} INNER JOIN {} p ON p.{} = {} WHERE p.{} IN ({})",
            ROOT_ALIAS,
            quote_ident(&pivot.local_column),
            quote_ident(OWNER_COLUMN),
            quote_ident(target.table()),
            ROOT_ALIAS,
            quote_ident(&pivot.table),
            quote_ident(&pivot.foreign_column),
            qualified(ROOT_ALIAS, &relation.foreign_key),
            quote_ident(&pivot.local_column),
            placeholders(keys.len())
        ),
        None => format!(
            "SELECT {}.* FROM {} {} WHERE {} IN ({})",
            ROOT_ALIAS,
            quote_ident(target.table()),
            ROOT_ALIAS,
            qualified(ROOT_ALIAS, &relation.foreign_key),
            placeholders(keys.len())
        ),
    };

    let constraints = [
        target.default_filter(),
        relation.constraint.clone(),
        node.filter.clone(),
    ];
    for constraint in constraints.iter().flatten() {
        sql.push_str(" AND ");
        sql.push_str(&render_filter(constraint, ROOT_ALIAS, target, &mut bindings)?);
    }

    sql.push_str(&format!(
        " ORDER BY {} ASC",
        qualified(ROOT_ALIAS, target.primary_key())
    ));
    Ok((sql, bindings))
}
