//! Query engine for metaorm.
//!
//! This module compiles [`EntityQuery`](metaorm_proto::EntityQuery) IR into
//! SQL, runs it through a [`Backend`](crate::Backend), materializes entities
//! and eager-loads their includes.

mod compiler;
mod executor;
mod join;
mod planner;
pub mod sql;

pub use compiler::{CompiledQuery, ProjectedColumn, QueryCompiler, ROOT_ALIAS};
pub use executor::{QueryExecutor, ResultSet};
pub use planner::{EagerLoadPlanner, FanoutBudget, LoadNode, LoadPlan, RelationNode};
