//! Compiled query plans.
//!
//! A plan is what the translator emits and the executor consumes: an
//! ordered, de-duplicated join list with prefix-scheme aliases, plus the
//! compiled predicates. Joins on to-many tables carry the validity-window
//! flag so historical evaluation composes with chain traversal.

use crate::mapping::GuardKey;
use medley_core::{ComponentKind, Generation, RecordClass};

/// The association tables a join can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssocTable {
    /// Name rows.
    Names,
    /// Address rows.
    Addresses,
    /// Identifier rows.
    Identifiers,
    /// Relationship rows.
    Relationships,
}

impl AssocTable {
    /// Table name used in alias construction.
    pub fn name(&self) -> &'static str {
        match self {
            AssocTable::Names => "name",
            AssocTable::Addresses => "address",
            AssocTable::Identifiers => "identifier",
            AssocTable::Relationships => "relationship",
        }
    }
}

/// One join in a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Prefix-scheme alias, unique within the plan (e.g. `j0_name`).
    pub alias: String,
    /// Target table.
    pub table: AssocTable,
    /// Whether the validity-window filter applies (true for every to-many
    /// association join).
    pub windowed: bool,
}

/// Where a compiled predicate reads its left-hand value.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateTarget {
    /// A key in the version field bag.
    Field(String),
    /// A component value within a joined name/address row.
    Component,
    /// The use label of a joined name/address row.
    UseCode,
    /// The value of a joined identifier row.
    IdentifierValue,
    /// The target key of a joined relationship row.
    RelationshipTarget,
    /// The version creation time. `first_version` selects the chain's
    /// sequence-1 row (the one with no replaces-pointer) instead of the row
    /// in effect at the evaluation generation.
    CreationTime {
        /// Compare against the first version, not the evaluated one.
        first_version: bool,
    },
    /// A probe of the denormalized phonetic value index.
    Phonetic {
        /// Restrict to these component kinds; empty means any name
        /// component.
        kinds: Vec<ComponentKind>,
    },
}

/// One compiled predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanPredicate {
    /// Alias of the join this predicate reads from; `None` for version-table
    /// targets.
    pub alias: Option<String>,
    /// Left-hand side.
    pub target: PredicateTarget,
    /// Resolved guard keys compiled to an IN-set restriction, if any.
    pub guard: Option<Vec<GuardKey>>,
    /// Operator.
    pub op: crate::filter::Comparator,
    /// Right-hand value.
    pub value: serde_json::Value,
}

/// A compiled query plan.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Record family scanned.
    pub class: RecordClass,
    /// Historical generation, if requested.
    pub as_of: Option<Generation>,
    /// Whether obsoleted records participate.
    pub include_retired: bool,
    /// De-duplicated joins in first-use order.
    pub joins: Vec<Join>,
    /// Compiled predicates, all conjoined.
    pub predicates: Vec<PlanPredicate>,
}

impl QueryPlan {
    /// Find a join by alias.
    pub fn join(&self, alias: &str) -> Option<&Join> {
        self.joins.iter().find(|j| j.alias == alias)
    }

    /// Reuse an existing join on `table` or add one, returning its alias.
    /// The alias prefix keeps nested plans collision-free.
    pub(crate) fn join_for(&mut self, prefix: &str, table: AssocTable) -> String {
        let alias = format!("{prefix}_{}", table.name());
        if self.join(&alias).is_none() {
            self.joins.push(Join {
                alias: alias.clone(),
                table,
                windowed: true,
            });
        }
        alias
    }
}
