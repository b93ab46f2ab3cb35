//! The static model-to-table mapping registry.
//!
//! Built once at process start; translation consults it for every path
//! root. There is no reflection here: an unknown segment is a fatal
//! mapping error, caught the first time the offending filter runs.

use crate::plan::AssocTable;
use medley_core::{ComponentKind, MedleyError, MedleyResult, RelationshipKind};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// What a path root resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootMapping {
    /// The version field bag; the next segment names the field key.
    Field,
    /// A to-many association table; joined with the validity-window filter.
    Assoc(AssocTable),
    /// The record creation time (version table, not an association).
    CreationTime,
}

static ROOTS: Lazy<FxHashMap<&'static str, RootMapping>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    m.insert("field", RootMapping::Field);
    m.insert("name", RootMapping::Assoc(AssocTable::Names));
    m.insert("address", RootMapping::Assoc(AssocTable::Addresses));
    m.insert("identifier", RootMapping::Assoc(AssocTable::Identifiers));
    m.insert("relationship", RootMapping::Assoc(AssocTable::Relationships));
    m.insert("creationTime", RootMapping::CreationTime);
    m
});

/// A resolved guard discriminator key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardKey {
    /// Restricts component rows to one kind.
    Component(ComponentKind),
    /// Restricts relationship rows to one kind.
    Relationship(RelationshipKind),
}

static GUARDS: Lazy<FxHashMap<&'static str, GuardKey>> = Lazy::new(|| {
    use ComponentKind::*;
    let mut m = FxHashMap::default();
    m.insert("given", GuardKey::Component(Given));
    m.insert("family", GuardKey::Component(Family));
    m.insert("prefix", GuardKey::Component(Prefix));
    m.insert("suffix", GuardKey::Component(Suffix));
    m.insert("street", GuardKey::Component(Street));
    m.insert("city", GuardKey::Component(City));
    m.insert("state", GuardKey::Component(State));
    m.insert("postal", GuardKey::Component(PostalCode));
    m.insert("country", GuardKey::Component(Country));
    m.insert("member", GuardKey::Relationship(RelationshipKind::Member));
    m.insert(
        "recordOfTruth",
        GuardKey::Relationship(RelationshipKind::RecordOfTruth),
    );
    m.insert("duplicate", GuardKey::Relationship(RelationshipKind::Duplicate));
    m
});

/// Resolve a path root, if mapped.
pub(crate) fn root_mapping(name: &str) -> Option<RootMapping> {
    ROOTS.get(name).copied()
}

/// Resolve symbolic guard names to keys. Any unknown name fails fast.
pub(crate) fn resolve_guard(names: &[String]) -> MedleyResult<Vec<GuardKey>> {
    names
        .iter()
        .map(|n| {
            GUARDS
                .get(n.as_str())
                .cloned()
                .ok_or_else(|| MedleyError::unresolved_guard(n.clone()))
        })
        .collect()
}
