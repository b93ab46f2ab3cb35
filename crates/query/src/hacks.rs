//! The query override ("hack") chain.
//!
//! Before the default join/filter is generated for a predicate, each
//! registered hack, in registration order, is offered first refusal to
//! replace the translation entirely. The first hack returning a fragment
//! wins; otherwise translation falls through to the default mapping. Hacks
//! exist for two reasons: semantic mismatches the default join cannot
//! express, and acceleration of common filters through denormalized lookup
//! structures. Hack errors propagate uncaught.

use crate::filter::{Comparator, Predicate};
use crate::mapping::{resolve_guard, GuardKey};
use crate::plan::{Join, PlanPredicate, PredicateTarget};
use medley_core::{ComponentKind, MedleyResult, RecordClass};

/// Immutable context offered to each hack.
#[derive(Debug)]
pub struct HackContext<'a> {
    /// Record family being queried.
    pub class: RecordClass,
    /// The predicate under translation.
    pub predicate: &'a Predicate,
    /// Alias prefix of the enclosing plan, for collision-free joins.
    pub alias_prefix: &'a str,
}

/// What a hack emits in place of the default translation.
#[derive(Debug, Default)]
pub struct PlanFragment {
    /// Joins to merge into the plan (de-duplicated by alias).
    pub joins: Vec<Join>,
    /// Compiled predicates to append.
    pub predicates: Vec<PlanPredicate>,
}

/// A registered query-generation override.
pub trait QueryHack: Send + Sync {
    /// Name used in trace output.
    fn name(&self) -> &'static str;

    /// Offer this predicate. Return `Ok(None)` to decline; the next hack is
    /// consulted, then the default mapping. Errors propagate.
    fn apply(&self, ctx: &HackContext<'_>) -> MedleyResult<Option<PlanFragment>>;
}

/// Resolves "creation time" to the *first* version's creation time.
///
/// The default mapping compares against the version in effect at the
/// evaluation generation, which for an updated record is not when the
/// record was created. This hack replaces the fragment with a correlated
/// check against the chain row that has no replaces-pointer.
#[derive(Debug, Default)]
pub struct CreationTimeHack;

impl QueryHack for CreationTimeHack {
    fn name(&self) -> &'static str {
        "creation-time"
    }

    fn apply(&self, ctx: &HackContext<'_>) -> MedleyResult<Option<PlanFragment>> {
        let path = &ctx.predicate.path;
        if path.root().name != "creationTime" || !path.rest().is_empty() {
            return Ok(None);
        }
        if ctx.predicate.op == Comparator::SoundsLike {
            return Ok(None);
        }
        Ok(Some(PlanFragment {
            joins: Vec::new(),
            predicates: vec![PlanPredicate {
                alias: None,
                target: PredicateTarget::CreationTime {
                    first_version: true,
                },
                guard: None,
                op: ctx.predicate.op,
                value: ctx.predicate.value.clone(),
            }],
        }))
    }
}

/// Answers `SoundsLike` name-component filters from the pre-materialized
/// phonetic value index instead of the name→component join.
#[derive(Debug, Default)]
pub struct PhoneticNameHack;

impl QueryHack for PhoneticNameHack {
    fn name(&self) -> &'static str {
        "phonetic-name"
    }

    fn apply(&self, ctx: &HackContext<'_>) -> MedleyResult<Option<PlanFragment>> {
        let pred = ctx.predicate;
        if pred.op != Comparator::SoundsLike {
            return Ok(None);
        }
        let path = &pred.path;
        let component = match path.rest() {
            [seg] if path.root().name == "name" && seg.name == "component" => seg,
            [seg, value] if path.root().name == "name" && seg.name == "component" && value.name == "value" => seg,
            _ => return Ok(None),
        };
        let kinds = match &component.guard {
            None => Vec::new(),
            Some(names) => resolve_guard(names)?
                .into_iter()
                .filter_map(|k| match k {
                    GuardKey::Component(kind) => Some(kind),
                    GuardKey::Relationship(_) => None,
                })
                .collect::<Vec<ComponentKind>>(),
        };
        Ok(Some(PlanFragment {
            joins: Vec::new(),
            predicates: vec![PlanPredicate {
                alias: None,
                target: PredicateTarget::Phonetic { kinds },
                guard: None,
                op: pred.op,
                value: pred.value.clone(),
            }],
        }))
    }
}
