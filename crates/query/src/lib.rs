//! Query predicate translation and execution.
//!
//! A [`Filter`] is a conjunction of property-path predicates. The
//! [`QueryTranslator`] compiles a filter into a [`QueryPlan`] (joins with a
//! prefix alias scheme, validity-window flags, and resolved guard sets)
//! via a static model-to-table mapping built once at startup. Before the
//! default mapping is applied to a predicate, each registered
//! [`QueryHack`] gets first refusal to replace the generated fragment; the
//! first that reports handled wins.
//!
//! The [`QueryExecutor`] evaluates a plan against the record store,
//! honoring association validity windows at the requested generation.

mod exec;
mod filter;
mod hacks;
mod mapping;
mod path;
mod phonetic;
mod plan;
mod translate;

pub use exec::QueryExecutor;
pub use filter::{Comparator, Filter, Predicate};
pub use hacks::{CreationTimeHack, HackContext, PhoneticNameHack, PlanFragment, QueryHack};
pub use mapping::GuardKey;
pub use path::{PathSegment, PropertyPath};
pub use phonetic::{soundex, PhoneticIndex};
pub use plan::{AssocTable, Join, PlanPredicate, PredicateTarget, QueryPlan};
pub use translate::QueryTranslator;

use medley_core::{MedleyResult, Principal, RecordId};
use medley_storage::RecordStore;
use std::sync::Arc;

/// Translator and executor wired together: the store's query entry point.
pub struct QueryService {
    translator: QueryTranslator,
    executor: QueryExecutor,
}

impl QueryService {
    /// Build a service over the given store and phonetic index, with the
    /// built-in hacks registered.
    pub fn new(store: Arc<RecordStore>, phonetics: Arc<PhoneticIndex>) -> Self {
        Self {
            translator: QueryTranslator::with_builtin_hacks(),
            executor: QueryExecutor::new(store, phonetics),
        }
    }

    /// Access the translator, e.g. to register additional hacks.
    pub fn translator_mut(&mut self) -> &mut QueryTranslator {
        &mut self.translator
    }

    /// Compile and run a filter. Returns matching record keys in
    /// deterministic order.
    pub fn query(&self, filter: &Filter, principal: &Principal) -> MedleyResult<Vec<RecordId>> {
        let plan = self.translator.translate(filter)?;
        tracing::debug!(
            class = %filter.class,
            principal = %principal.name,
            joins = plan.joins.len(),
            "executing query plan"
        );
        self.executor.execute(&plan)
    }
}
