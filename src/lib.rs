//! Medley: a versioned clinical record store with master-data merge.
//!
//! The workspace crates each own one concern:
//!
//! - `medley-core`: shared model types, errors, provenance, policy seams
//! - `medley-storage`: the temporally versioned record store
//! - `medley-query`: predicate translation and execution
//! - `medley-mdm`: master linkage and read-time merge projections
//! - `medley-cache`: the stateful query continuation cache
//!
//! This crate re-exports the public surface and wires the pieces into a
//! [`Platform`]. All coupling between components is explicit: the store
//! never calls back into the merge engine or the phonetic index; the
//! platform sequences them on every write.

pub use medley_cache::{CacheOptions, QuerySetCache};
pub use medley_core::{
    Address, AssociationId, AuthorityId, ComponentKind, ErrorDetail, FieldMap, Generation,
    GrantAll, Identifier, MedleyError, MedleyResult, Name, NameComponent, PolicyDecider,
    PolicyDecision, PolicyGrant, PolicyId, Principal, Provenance, ProvenanceId, QueryId,
    RecordClass, RecordDraft, RecordId, RecordView, Relationship, RelationshipKind, Severity,
    Version, VersionHead, VersionId, Window, WriteContext,
};
pub use medley_mdm::{
    MatchDecision, MdmEngine, NeverMatches, RecordMatcher, ReviewQueue, ReviewSink,
};
pub use medley_query::{
    Comparator, Filter, PhoneticIndex, Predicate, PropertyPath, QueryHack, QueryService,
    QueryTranslator,
};
pub use medley_storage::{
    AccessMode, IdentityAuthority, RecordStore, StoreOptions, VersionSelector,
};

use std::sync::Arc;
use tracing::instrument;

/// The assembled data core: store, indexes, query, merge, and continuation
/// cache behind one entry point.
///
/// Writes go through the platform so the phonetic index and the merge
/// engine observe every committed version. Reading the store directly is
/// fine; writing to it directly leaves the indexes stale.
pub struct Platform {
    store: Arc<RecordStore>,
    phonetics: Arc<PhoneticIndex>,
    query: QueryService,
    mdm: MdmEngine,
    cache: QuerySetCache,
}

impl Platform {
    /// A platform with default collaborators: no automatic matching, an
    /// in-memory review sink, and a grant-all policy decider.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a platform.
    pub fn builder() -> PlatformBuilder {
        PlatformBuilder::new()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a record: persist it, index its names phonetically, and run
    /// master linkage.
    #[instrument(skip_all, fields(application = %ctx.provenance.application))]
    pub fn insert(&self, draft: RecordDraft, ctx: &WriteContext) -> MedleyResult<RecordView> {
        let view = self.store.insert(draft, ctx)?;
        self.phonetics.index_record(&view);
        self.mdm.on_record_written(&view, ctx)?;
        Ok(view)
    }

    /// Update a record under optimistic concurrency, then refresh the
    /// indexes from the committed version.
    #[instrument(skip_all, fields(application = %ctx.provenance.application))]
    pub fn update(
        &self,
        draft: RecordDraft,
        expected: VersionId,
        ctx: &WriteContext,
    ) -> MedleyResult<RecordView> {
        let view = self.store.update(draft, expected, ctx)?;
        self.phonetics.index_record(&view);
        self.mdm.on_record_written(&view, ctx)?;
        Ok(view)
    }

    /// Retire a record and drop it from the phonetic index.
    pub fn obsolete(&self, id: RecordId, ctx: &WriteContext) -> MedleyResult<RecordView> {
        let view = self.store.obsolete(id, ctx)?;
        self.phonetics.remove_record(id);
        Ok(view)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Compile and run a filter, returning matching record keys.
    pub fn query(&self, filter: &Filter, principal: &Principal) -> MedleyResult<Vec<RecordId>> {
        self.query.query(filter, principal)
    }

    /// Run a filter and register the result set for continuation, returning
    /// the query key and the first page.
    pub fn open_query(
        &self,
        filter: &Filter,
        principal: &Principal,
        page_size: usize,
    ) -> MedleyResult<(QueryId, Vec<RecordId>)> {
        let keys = self.query.query(filter, principal)?;
        let id = QueryId::new();
        let total = keys.len();
        self.cache.register_query_set(id, keys, None, total);
        let page = self.cache.get_query_results(id, 0, page_size)?;
        Ok((id, page))
    }

    /// Read a later page of a registered result set.
    pub fn next_page(
        &self,
        id: QueryId,
        offset: usize,
        count: usize,
    ) -> MedleyResult<Vec<RecordId>> {
        self.cache.get_query_results(id, offset, count)
    }

    // =========================================================================
    // Component access
    // =========================================================================

    /// The record store.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// The merge engine.
    pub fn mdm(&self) -> &MdmEngine {
        &self.mdm
    }

    /// The continuation cache.
    pub fn cache(&self) -> &QuerySetCache {
        &self.cache
    }

    /// The phonetic index.
    pub fn phonetics(&self) -> &Arc<PhoneticIndex> {
        &self.phonetics
    }

    /// The query service, e.g. to register additional hacks.
    pub fn query_service_mut(&mut self) -> &mut QueryService {
        &mut self.query
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures and assembles a [`Platform`].
pub struct PlatformBuilder {
    store_options: StoreOptions,
    cache_options: CacheOptions,
    matcher: Arc<dyn RecordMatcher>,
    review: Arc<dyn ReviewQueue>,
    decider: Arc<dyn PolicyDecider>,
}

impl PlatformBuilder {
    fn new() -> Self {
        Self {
            store_options: StoreOptions::new(),
            cache_options: CacheOptions::new(),
            matcher: Arc::new(NeverMatches),
            review: Arc::new(ReviewSink::new()),
            decider: Arc::new(GrantAll),
        }
    }

    /// Store configuration.
    pub fn store_options(mut self, options: StoreOptions) -> Self {
        self.store_options = options;
        self
    }

    /// Continuation cache configuration.
    pub fn cache_options(mut self, options: CacheOptions) -> Self {
        self.cache_options = options;
        self
    }

    /// The record-linkage collaborator.
    pub fn matcher(mut self, matcher: Arc<dyn RecordMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Where probable matches go for review.
    pub fn review_queue(mut self, review: Arc<dyn ReviewQueue>) -> Self {
        self.review = review;
        self
    }

    /// The policy decision point.
    pub fn policy_decider(mut self, decider: Arc<dyn PolicyDecider>) -> Self {
        self.decider = decider;
        self
    }

    /// Assemble the platform.
    pub fn build(self) -> Platform {
        let store = Arc::new(RecordStore::with_options(self.store_options));
        let phonetics = Arc::new(PhoneticIndex::new());
        let query = QueryService::new(store.clone(), phonetics.clone());
        let mdm = MdmEngine::new(
            store.clone(),
            self.matcher,
            self.review,
            self.decider,
        );
        let cache = QuerySetCache::with_options(self.cache_options);
        Platform {
            store,
            phonetics,
            query,
            mdm,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> WriteContext {
        WriteContext::new(Principal::new("tester"), "facade-tests")
    }

    #[test]
    fn insert_feeds_phonetics_and_linkage() {
        let platform = Platform::new();
        let view = platform
            .insert(
                RecordDraft::new(RecordClass::Patient).with_name(Name::simple("Ada", "Lovelace")),
                &ctx(),
            )
            .unwrap();

        assert!(platform.mdm().master_of(view.head.id).is_some());
        let hits = platform
            .query(
                &Filter::for_class(RecordClass::Patient)
                    .and("name.component[family]", Comparator::SoundsLike, json!("Loveless"))
                    .unwrap(),
                &Principal::new("reader"),
            )
            .unwrap();
        assert_eq!(hits, vec![view.head.id]);
    }

    #[test]
    fn open_query_pages_through_the_cache() {
        let platform = Platform::new();
        for i in 0..5 {
            platform
                .insert(
                    RecordDraft::new(RecordClass::Patient).with_field("n", json!(i)),
                    &ctx(),
                )
                .unwrap();
        }
        let filter = Filter::for_class(RecordClass::Patient);
        let (id, first) = platform
            .open_query(&filter, &Principal::new("reader"), 2)
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(platform.next_page(id, 2, 2).unwrap().len(), 2);
        assert_eq!(platform.next_page(id, 4, 2).unwrap().len(), 1);
    }

    #[test]
    fn obsolete_clears_phonetic_postings() {
        let platform = Platform::new();
        let view = platform
            .insert(
                RecordDraft::new(RecordClass::Patient).with_name(Name::simple("Ada", "Lovelace")),
                &ctx(),
            )
            .unwrap();
        platform.obsolete(view.head.id, &ctx()).unwrap();

        let hits = platform
            .query(
                &Filter::for_class(RecordClass::Patient)
                    .and("name.component[family]", Comparator::SoundsLike, json!("Lovelace"))
                    .unwrap(),
                &Principal::new("reader"),
            )
            .unwrap();
        assert!(hits.is_empty());
    }
}
