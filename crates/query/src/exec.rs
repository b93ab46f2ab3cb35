//! Plan execution against the record store.
//!
//! The executor scans one record family and evaluates the compiled
//! predicates, honoring validity windows at the evaluation generation.
//! Predicates sharing a join alias must be satisfied by a single row of
//! that join, matching relational join semantics.

use crate::filter::Comparator;
use crate::mapping::GuardKey;
use crate::phonetic::{soundex, PhoneticIndex};
use crate::plan::{AssocTable, PlanPredicate, PredicateTarget, QueryPlan};
use chrono::{DateTime, Utc};
use medley_core::{
    ComponentKind, Generation, MedleyError, MedleyResult, NameComponent, RecordId, Version,
    VersionHead,
};
use medley_storage::RecordStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluates query plans over the store and the phonetic index.
pub struct QueryExecutor {
    store: Arc<RecordStore>,
    phonetics: Arc<PhoneticIndex>,
}

impl QueryExecutor {
    /// Build an executor.
    pub fn new(store: Arc<RecordStore>, phonetics: Arc<PhoneticIndex>) -> Self {
        Self { store, phonetics }
    }

    /// Run a plan, returning matching record keys in key order.
    pub fn execute(&self, plan: &QueryPlan) -> MedleyResult<Vec<RecordId>> {
        let mut out = Vec::new();
        for head in self.store.heads_of_class(plan.class) {
            if head.is_retired() && !plan.include_retired {
                continue;
            }
            let at = plan.as_of.unwrap_or(head.generation);
            let version = match self.store.version_at(head.id, at) {
                Some(v) => v,
                // The record did not exist at the requested generation.
                None => continue,
            };
            if self.matches(plan, &head, &version, at)? {
                out.push(head.id);
            }
        }
        Ok(out)
    }

    fn matches(
        &self,
        plan: &QueryPlan,
        head: &VersionHead,
        version: &Version,
        at: Generation,
    ) -> MedleyResult<bool> {
        let mut grouped: BTreeMap<&str, Vec<&PlanPredicate>> = BTreeMap::new();
        for predicate in &plan.predicates {
            match &predicate.alias {
                None => {
                    if !self.root_predicate_matches(predicate, head, version)? {
                        return Ok(false);
                    }
                }
                Some(alias) => grouped.entry(alias).or_default().push(predicate),
            }
        }

        for (alias, predicates) in grouped {
            let join = plan
                .join(alias)
                .ok_or_else(|| MedleyError::query_mapping(alias))?;
            if !self.join_group_matches(join.table, head.id, at, &predicates)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn root_predicate_matches(
        &self,
        predicate: &PlanPredicate,
        head: &VersionHead,
        version: &Version,
    ) -> MedleyResult<bool> {
        match &predicate.target {
            PredicateTarget::Field(key) => Ok(match version.fields.get(key) {
                Some(actual) => compare_json(predicate.op, actual, &predicate.value),
                None => predicate.op == Comparator::Ne,
            }),
            PredicateTarget::CreationTime { first_version } => {
                let actual = if *first_version {
                    // The chain row with no replaces-pointer.
                    self.store
                        .versions(head.id)?
                        .into_iter()
                        .find(|v| v.replaces.is_none())
                        .map(|v| v.created_at)
                        .ok_or_else(|| {
                            MedleyError::not_found(format!("first version of {}", head.id))
                        })?
                } else {
                    version.created_at
                };
                let expected = parse_time(&predicate.value)?;
                Ok(compare_ord(predicate.op, &actual, &expected))
            }
            PredicateTarget::Phonetic { kinds } => {
                let word = predicate.value.as_str().ok_or_else(|| {
                    MedleyError::constraint("query.value", "phonetic filter value must be a string")
                })?;
                let code = match soundex(word) {
                    Some(c) => c,
                    None => return Ok(false),
                };
                Ok(self.phonetics.matches(head.id, kinds, &code))
            }
            other => Err(MedleyError::query_mapping(format!(
                "target {other:?} requires a join alias"
            ))),
        }
    }

    /// A single row of the joined table must satisfy every predicate in the
    /// group.
    fn join_group_matches(
        &self,
        table: AssocTable,
        id: RecordId,
        at: Generation,
        predicates: &[&PlanPredicate],
    ) -> MedleyResult<bool> {
        match table {
            AssocTable::Names => Ok(self.store.name_rows(id).iter().any(|row| {
                row.visible_at(at)
                    && predicates.iter().all(|p| {
                        name_like_matches(p, &row.value.use_code, &row.value.components)
                    })
            })),
            AssocTable::Addresses => Ok(self.store.address_rows(id).iter().any(|row| {
                row.visible_at(at)
                    && predicates.iter().all(|p| {
                        name_like_matches(p, &row.value.use_code, &row.value.components)
                    })
            })),
            AssocTable::Identifiers => Ok(self.store.identifier_rows(id).iter().any(|row| {
                row.visible_at(at)
                    && predicates.iter().all(|p| match &p.target {
                        PredicateTarget::IdentifierValue => {
                            compare_json_str(p.op, &row.value.value, &p.value)
                        }
                        _ => false,
                    })
            })),
            AssocTable::Relationships => Ok(self.store.relationship_rows(id).iter().any(|row| {
                row.visible_at(at)
                    && predicates.iter().all(|p| match &p.target {
                        PredicateTarget::RelationshipTarget => {
                            let kind_ok = p.guard.as_ref().map_or(true, |keys| {
                                keys.iter().any(|k| {
                                    matches!(k, GuardKey::Relationship(rk) if rk == &row.value.kind)
                                })
                            });
                            kind_ok
                                && compare_json_str(
                                    p.op,
                                    &row.value.target.to_string(),
                                    &p.value,
                                )
                        }
                        _ => false,
                    })
            })),
        }
    }
}

fn name_like_matches(
    predicate: &PlanPredicate,
    use_code: &str,
    components: &[NameComponent],
) -> bool {
    match &predicate.target {
        PredicateTarget::UseCode => compare_json_str(predicate.op, use_code, &predicate.value),
        PredicateTarget::Component => components.iter().any(|c| {
            guard_allows(&predicate.guard, c.kind)
                && compare_json_str(predicate.op, &c.value, &predicate.value)
        }),
        _ => false,
    }
}

fn guard_allows(guard: &Option<Vec<GuardKey>>, kind: ComponentKind) -> bool {
    match guard {
        None => true,
        Some(keys) => keys
            .iter()
            .any(|k| matches!(k, GuardKey::Component(g) if *g == kind)),
    }
}

fn parse_time(value: &serde_json::Value) -> MedleyResult<DateTime<Utc>> {
    let raw = value.as_str().ok_or_else(|| {
        MedleyError::constraint("query.value", "time filter value must be a string")
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MedleyError::constraint("query.value", format!("bad timestamp '{raw}': {e}")))
}

fn compare_ord<T: PartialOrd>(op: Comparator, actual: &T, expected: &T) -> bool {
    match op {
        Comparator::Eq => actual == expected,
        Comparator::Ne => actual != expected,
        Comparator::Lt => actual < expected,
        Comparator::Le => actual <= expected,
        Comparator::Gt => actual > expected,
        Comparator::Ge => actual >= expected,
        Comparator::Contains | Comparator::StartsWith | Comparator::SoundsLike => false,
    }
}

fn compare_str(op: Comparator, actual: &str, expected: &str) -> bool {
    match op {
        Comparator::Contains => actual.contains(expected),
        Comparator::StartsWith => actual.starts_with(expected),
        Comparator::SoundsLike => false,
        _ => compare_ord(op, &actual, &expected),
    }
}

fn compare_json_str(op: Comparator, actual: &str, expected: &serde_json::Value) -> bool {
    expected
        .as_str()
        .map_or(false, |e| compare_str(op, actual, e))
}

fn compare_json(op: Comparator, actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => compare_str(op, a, e),
        (Value::Number(a), Value::Number(e)) => match (a.as_f64(), e.as_f64()) {
            (Some(a), Some(e)) => compare_ord(op, &a, &e),
            _ => false,
        },
        (a, e) => match op {
            Comparator::Eq => a == e,
            Comparator::Ne => a != e,
            _ => false,
        },
    }
}
