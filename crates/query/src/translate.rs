//! Filter → plan translation.

use crate::filter::{Comparator, Filter, Predicate};
use crate::hacks::{CreationTimeHack, HackContext, PhoneticNameHack, QueryHack};
use crate::mapping::{resolve_guard, root_mapping, GuardKey, RootMapping};
use crate::plan::{AssocTable, PlanPredicate, PredicateTarget, QueryPlan};
use medley_core::{MedleyError, MedleyResult};
use tracing::debug;

/// Compiles filters into plans through the static mapping registry, giving
/// each registered hack first refusal per predicate.
#[derive(Default)]
pub struct QueryTranslator {
    hacks: Vec<Box<dyn QueryHack>>,
}

impl QueryTranslator {
    /// A translator with no hacks registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A translator with the built-in hacks registered, in priority order.
    pub fn with_builtin_hacks() -> Self {
        let mut t = Self::new();
        t.register_hack(Box::new(CreationTimeHack));
        t.register_hack(Box::new(PhoneticNameHack));
        t
    }

    /// Append a hack. Earlier registrations take priority.
    pub fn register_hack(&mut self, hack: Box<dyn QueryHack>) {
        self.hacks.push(hack);
    }

    /// Translate one filter. Predicates sharing a path prefix reuse the
    /// same join; unmapped paths fail fatally.
    pub fn translate(&self, filter: &Filter) -> MedleyResult<QueryPlan> {
        let mut plan = QueryPlan {
            class: filter.class,
            as_of: filter.as_of,
            include_retired: filter.include_retired,
            joins: Vec::new(),
            predicates: Vec::new(),
        };
        // One prefix per translation scope; a nested sub-predicate scope
        // would allocate "s1", "s2", … to keep aliases collision-free.
        let prefix = "j0";

        for predicate in &filter.predicates {
            if self.try_hacks(&mut plan, prefix, filter, predicate)? {
                continue;
            }
            self.translate_default(&mut plan, prefix, predicate)?;
        }
        Ok(plan)
    }

    fn try_hacks(
        &self,
        plan: &mut QueryPlan,
        prefix: &str,
        filter: &Filter,
        predicate: &Predicate,
    ) -> MedleyResult<bool> {
        let ctx = HackContext {
            class: filter.class,
            predicate,
            alias_prefix: prefix,
        };
        for hack in &self.hacks {
            if let Some(fragment) = hack.apply(&ctx)? {
                debug!(
                    hack = hack.name(),
                    path = %predicate.path,
                    "hack replaced default translation"
                );
                for join in fragment.joins {
                    if plan.join(&join.alias).is_none() {
                        plan.joins.push(join);
                    }
                }
                plan.predicates.extend(fragment.predicates);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn translate_default(
        &self,
        plan: &mut QueryPlan,
        prefix: &str,
        predicate: &Predicate,
    ) -> MedleyResult<()> {
        let path = &predicate.path;
        let unmapped = || MedleyError::query_mapping(path.raw());

        // No default mapping exists for phonetic comparison; only a hack
        // can express it.
        if predicate.op == Comparator::SoundsLike {
            return Err(unmapped());
        }

        let root = path.root();
        let mapping = root_mapping(&root.name).ok_or_else(unmapped)?;

        let (alias, target, guard) = match mapping {
            RootMapping::Field => {
                if root.guard.is_some() {
                    return Err(unmapped());
                }
                match path.rest() {
                    [key] if key.guard.is_none() => {
                        (None, PredicateTarget::Field(key.name.clone()), None)
                    }
                    _ => return Err(unmapped()),
                }
            }
            RootMapping::CreationTime => {
                if root.guard.is_some() || !path.rest().is_empty() {
                    return Err(unmapped());
                }
                (
                    None,
                    PredicateTarget::CreationTime {
                        first_version: false,
                    },
                    None,
                )
            }
            RootMapping::Assoc(table) => {
                self.translate_assoc(plan, prefix, predicate, table, &unmapped)?
            }
        };

        plan.predicates.push(PlanPredicate {
            alias,
            target,
            guard,
            op: predicate.op,
            value: predicate.value.clone(),
        });
        Ok(())
    }

    /// Default join/filter for an association-table path. Returns
    /// (alias, target, guard).
    fn translate_assoc(
        &self,
        plan: &mut QueryPlan,
        prefix: &str,
        predicate: &Predicate,
        table: AssocTable,
        unmapped: &dyn Fn() -> MedleyError,
    ) -> MedleyResult<(Option<String>, PredicateTarget, Option<Vec<GuardKey>>)> {
        let path = &predicate.path;
        let root = path.root();

        match table {
            AssocTable::Names | AssocTable::Addresses => {
                if root.guard.is_some() {
                    return Err(unmapped());
                }
                let (target, guard) = match path.rest() {
                    [seg] if seg.name == "use" && seg.guard.is_none() => {
                        (PredicateTarget::UseCode, None)
                    }
                    [seg] if seg.name == "component" => {
                        (PredicateTarget::Component, seg.guard.clone())
                    }
                    [seg, value]
                        if seg.name == "component"
                            && value.name == "value"
                            && value.guard.is_none() =>
                    {
                        (PredicateTarget::Component, seg.guard.clone())
                    }
                    _ => return Err(unmapped()),
                };
                let guard = guard
                    .map(|names| {
                        let keys = resolve_guard(&names)?;
                        for key in &keys {
                            if !matches!(key, GuardKey::Component(_)) {
                                return Err(MedleyError::unresolved_guard(
                                    names.join(","),
                                ));
                            }
                        }
                        Ok(keys)
                    })
                    .transpose()?;
                let alias = plan.join_for(prefix, table);
                Ok((Some(alias), target, guard))
            }
            AssocTable::Identifiers => {
                if root.guard.is_some() {
                    return Err(unmapped());
                }
                match path.rest() {
                    [seg] if seg.name == "value" && seg.guard.is_none() => {
                        let alias = plan.join_for(prefix, table);
                        Ok((Some(alias), PredicateTarget::IdentifierValue, None))
                    }
                    _ => Err(unmapped()),
                }
            }
            AssocTable::Relationships => {
                let guard = root
                    .guard
                    .as_ref()
                    .map(|names| {
                        let keys = resolve_guard(names)?;
                        for key in &keys {
                            if !matches!(key, GuardKey::Relationship(_)) {
                                return Err(MedleyError::unresolved_guard(
                                    names.join(","),
                                ));
                            }
                        }
                        Ok(keys)
                    })
                    .transpose()?;
                match path.rest() {
                    [seg] if seg.name == "target" && seg.guard.is_none() => {
                        let alias = plan.join_for(prefix, table);
                        Ok((Some(alias), PredicateTarget::RelationshipTarget, guard))
                    }
                    _ => Err(unmapped()),
                }
            }
        }
    }
}
