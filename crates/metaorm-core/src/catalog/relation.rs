//! Relation definitions between entities.

use serde::{Deserialize, Serialize};

use metaorm_proto::FilterExpr;

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// At most one related entity per owner.
    OneToOne,
    /// Any number of related entities per owner.
    OneToMany,
    /// Related through a pivot table.
    ManyToMany,
}

/// Pivot table wiring for many-to-many relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotDef {
    /// Pivot table name.
    pub table: String,
    /// Pivot column holding the owner's local key.
    pub local_column: String,
    /// Pivot column holding the target's foreign key.
    pub foreign_column: String,
}

/// A relation from an owning entity type to a target entity type.
///
/// Owners are matched to targets by `owner.local_key == target.foreign_key`.
/// A has-many relation uses the owner's primary key as `local_key`; a
/// belongs-to relation uses the owner's foreign key column as `local_key` and
/// the target's primary key as `foreign_key`. Many-to-many relations go
/// through `pivot`: `owner.local_key == pivot.local_column` and
/// `pivot.foreign_column == target.foreign_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name (unique within the owning entity type).
    pub name: String,
    /// Relation cardinality.
    pub kind: Cardinality,
    /// Target entity type name.
    pub target: String,
    /// Column on the owner.
    pub local_key: String,
    /// Column on the target.
    pub foreign_key: String,
    /// Extra constraint applied to every load of this relation.
    #[serde(default)]
    pub constraint: Option<FilterExpr>,
    /// Pivot table for many-to-many relations.
    #[serde(default)]
    pub pivot: Option<PivotDef>,
}

impl RelationDef {
    /// Create a one-to-one relation.
    pub fn one_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: Cardinality::OneToOne,
            target: target.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            constraint: None,
            pivot: None,
        }
    }

    /// Create a one-to-many relation.
    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            kind: Cardinality::OneToMany,
            ..Self::one_to_one(name, target, local_key, foreign_key)
        }
    }

    /// Create a many-to-many relation through a pivot table.
    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
        pivot: PivotDef,
    ) -> Self {
        Self {
            kind: Cardinality::ManyToMany,
            pivot: Some(pivot),
            ..Self::one_to_one(name, target, local_key, foreign_key)
        }
    }

    /// Attach a constraint applied whenever this relation is loaded.
    pub fn with_constraint(mut self, constraint: FilterExpr) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Check if this is a many-to-many relation.
    pub fn is_many_to_many(&self) -> bool {
        self.kind == Cardinality::ManyToMany
    }

    /// Check if owners hold a single related entity.
    pub fn is_single(&self) -> bool {
        self.kind == Cardinality::OneToOne
    }
}

impl PivotDef {
    /// Create pivot wiring.
    pub fn new(
        table: impl Into<String>,
        local_column: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            local_column: local_column.into(),
            foreign_column: foreign_column.into(),
        }
    }
}
