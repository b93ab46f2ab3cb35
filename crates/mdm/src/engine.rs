//! Linkage lifecycle and master projection.

use crate::matcher::{MatchDecision, RecordMatcher, ReviewQueue};
use crate::merge;
use medley_core::{
    MedleyError, MedleyResult, PolicyDecider, PolicyDecision, Principal, RecordClass, RecordDraft,
    RecordId, RecordView, RelationshipKind, WriteContext,
};
use medley_storage::RecordStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Orchestrates master linkage for local records and computes master
/// projections at read time.
///
/// The engine holds no state of its own; linkage lives in the store as
/// `Member` and `RecordOfTruth` relationships on master records, so it is
/// versioned and queryable like any other association.
pub struct MdmEngine {
    store: Arc<RecordStore>,
    matcher: Arc<dyn RecordMatcher>,
    review: Arc<dyn ReviewQueue>,
    decider: Arc<dyn PolicyDecider>,
}

impl MdmEngine {
    /// Wire an engine over the store and its collaborators.
    pub fn new(
        store: Arc<RecordStore>,
        matcher: Arc<dyn RecordMatcher>,
        review: Arc<dyn ReviewQueue>,
        decider: Arc<dyn PolicyDecider>,
    ) -> Self {
        Self {
            store,
            matcher,
            review,
            decider,
        }
    }

    // =========================================================================
    // Linkage
    // =========================================================================

    /// React to a local record having been written.
    ///
    /// Master records themselves and locals that already belong to a master
    /// pass through untouched. Otherwise the match collaborator decides:
    /// no-match locals get a fresh singleton master, matched locals join the
    /// candidate master, and probable matches go to review unlinked.
    ///
    /// Returns the master the local belongs to afterwards, if any.
    pub fn on_record_written(
        &self,
        view: &RecordView,
        ctx: &WriteContext,
    ) -> MedleyResult<Option<RecordId>> {
        if view.head.class == RecordClass::Master {
            return Ok(None);
        }
        let local = view.head.id;
        if let Some(existing) = self.master_of(local) {
            return Ok(Some(existing));
        }

        match self.matcher.classify(view, &self.store) {
            MatchDecision::NoMatch => {
                let master = self.create_singleton(local, ctx)?;
                info!(%local, %master, "created singleton master");
                Ok(Some(master))
            }
            MatchDecision::Match(master) => {
                self.link_member(master, local, ctx)?;
                info!(%local, %master, "linked local to matched master");
                Ok(Some(master))
            }
            MatchDecision::Probable => {
                debug!(%local, "probable match, queued for review");
                self.review.enqueue(local);
                Ok(None)
            }
        }
    }

    /// The master a local currently belongs to, if any.
    pub fn master_of(&self, local: RecordId) -> Option<RecordId> {
        self.store
            .relations_to(local, &RelationshipKind::Member)
            .into_iter()
            .find(|owner| {
                self.store
                    .head(*owner)
                    .map_or(false, |h| h.class == RecordClass::Master && !h.is_retired())
            })
    }

    /// Members of a master, in the order they were linked.
    pub fn members(&self, master: RecordId) -> MedleyResult<Vec<RecordId>> {
        let view = self.master_view(master)?;
        Ok(view
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Member)
            .map(|r| r.target)
            .collect())
    }

    /// Link a local into an existing master. Linking an existing member is a
    /// no-op.
    pub fn link_member(
        &self,
        master: RecordId,
        local: RecordId,
        ctx: &WriteContext,
    ) -> MedleyResult<()> {
        let view = self.master_view(master)?;
        if view
            .relationships
            .iter()
            .any(|r| r.kind == RelationshipKind::Member && r.target == local)
        {
            return Ok(());
        }
        let draft = view
            .draft()
            .with_relationship(RelationshipKind::Member, local);
        self.store.update(draft, view.head.current, ctx)?;
        Ok(())
    }

    /// Designate one member as the record of truth for its master.
    ///
    /// The record of truth seeds the projection outright; only one may exist
    /// per master, and it must already be a member.
    pub fn set_record_of_truth(
        &self,
        master: RecordId,
        local: RecordId,
        ctx: &WriteContext,
    ) -> MedleyResult<()> {
        let view = self.master_view(master)?;
        if !view
            .relationships
            .iter()
            .any(|r| r.kind == RelationshipKind::Member && r.target == local)
        {
            return Err(MedleyError::business_rule(
                "mdm.rot.nonmember",
                format!("record {local} is not a member of master {master}"),
            ));
        }
        if view
            .relationships
            .iter()
            .any(|r| r.kind == RelationshipKind::RecordOfTruth)
        {
            return Err(MedleyError::business_rule(
                "mdm.rot.multiple",
                format!("master {master} already has a record of truth"),
            ));
        }
        let draft = view
            .draft()
            .with_relationship(RelationshipKind::RecordOfTruth, local);
        self.store.update(draft, view.head.current, ctx)?;
        info!(%master, %local, "record of truth designated");
        Ok(())
    }

    /// Detach a local from its master.
    ///
    /// The local moves into `into` when given, otherwise into a fresh
    /// singleton master. A master left with no members is retired. Returns
    /// the local's new master.
    ///
    /// The destination must be a live master other than the one the local
    /// already belongs to; an unusable destination fails before anything is
    /// written, so the local keeps its current link.
    pub fn unlink(
        &self,
        local: RecordId,
        into: Option<RecordId>,
        ctx: &WriteContext,
    ) -> MedleyResult<RecordId> {
        let master = self
            .master_of(local)
            .ok_or_else(|| MedleyError::not_found(format!("master link for record {local}")))?;

        if let Some(target) = into {
            if target == master {
                return Err(MedleyError::business_rule(
                    "mdm.unlink.destination",
                    format!("record {local} already belongs to master {target}"),
                ));
            }
            let destination = self.master_view(target)?;
            if destination.head.is_retired() {
                return Err(MedleyError::business_rule(
                    "mdm.unlink.destination",
                    format!("destination master {target} is retired"),
                ));
            }
        }

        let view = self.master_view(master)?;
        let mut draft = view.draft();
        draft.relationships.retain(|r| {
            !(r.target == local
                && matches!(
                    r.kind,
                    RelationshipKind::Member | RelationshipKind::RecordOfTruth
                ))
        });
        let remaining = draft
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Member)
            .count();
        self.store.update(draft, view.head.current, ctx)?;

        let destination = match into {
            Some(target) => {
                self.link_member(target, local, ctx)?;
                target
            }
            None => self.create_singleton(local, ctx)?,
        };
        if remaining == 0 {
            self.store.obsolete(master, ctx)?;
            info!(%master, "retired master with no remaining members");
        }
        info!(%local, from = %master, to = %destination, "local moved between masters");
        Ok(destination)
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// Compute the merged projection of a master for one caller.
    ///
    /// The projection is synthesized on every call and never persisted. A
    /// record of truth, when designated, seeds it with a full copy; the
    /// remaining policy-visible members then backfill missing attributes in
    /// link order, first non-null value winning per field. Members guarded
    /// by a policy the caller is not granted are left out entirely unless
    /// the policy allows override.
    pub fn get_master(&self, master: RecordId, principal: &Principal) -> MedleyResult<RecordView> {
        let view = self.master_view(master)?;
        if view.head.is_retired() {
            return Err(MedleyError::not_found(format!("master {master}")));
        }

        let member_ids: Vec<RecordId> = view
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Member)
            .map(|r| r.target)
            .collect();
        if member_ids.is_empty() {
            return Err(MedleyError::not_found(format!(
                "master {master} has no members"
            )));
        }
        let rot = view
            .relationships
            .iter()
            .find(|r| r.kind == RelationshipKind::RecordOfTruth)
            .map(|r| r.target);

        let mut projection = view;
        if let Some(rot_id) = rot {
            let source = self.store.get_current(rot_id)?;
            merge::seed(&mut projection, &source);
        }
        for id in member_ids {
            if Some(id) == rot {
                continue;
            }
            let member = self.store.get_current(id)?;
            if !self.visible_to(principal, &member) {
                debug!(%master, member = %id, "member excluded from projection by policy");
                continue;
            }
            merge::backfill(&mut projection, &member);
        }

        projection
            .tags
            .insert("mdm.type".to_string(), "M".to_string());
        Ok(projection)
    }

    /// Whether every policy on the member admits the caller. Override-capable
    /// policies never exclude; the elevation itself is the caller's problem.
    fn visible_to(&self, principal: &Principal, member: &RecordView) -> bool {
        member.policies.iter().all(|grant| {
            grant.override_capable
                || self.decider.decide(principal, grant.policy) == PolicyDecision::Grant
        })
    }

    fn master_view(&self, master: RecordId) -> MedleyResult<RecordView> {
        let view = self.store.get_current(master)?;
        if view.head.class != RecordClass::Master {
            return Err(MedleyError::business_rule(
                "mdm.master.class",
                format!("record {master} is not a master record"),
            ));
        }
        Ok(view)
    }

    fn create_singleton(&self, local: RecordId, ctx: &WriteContext) -> MedleyResult<RecordId> {
        let draft = RecordDraft::new(RecordClass::Master)
            .with_relationship(RelationshipKind::Member, local);
        let master = self.store.insert(draft, ctx)?;
        Ok(master.head.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{NeverMatches, ReviewSink};
    use medley_core::{GrantAll, Name, PolicyId};
    use parking_lot::Mutex;
    use serde_json::json;

    struct Scripted {
        decisions: Mutex<Vec<MatchDecision>>,
    }

    impl Scripted {
        fn new(decisions: Vec<MatchDecision>) -> Self {
            Self {
                decisions: Mutex::new(decisions),
            }
        }
    }

    impl RecordMatcher for Scripted {
        fn classify(&self, _local: &RecordView, _store: &RecordStore) -> MatchDecision {
            self.decisions
                .lock()
                .pop()
                .unwrap_or(MatchDecision::NoMatch)
        }
    }

    fn ctx() -> WriteContext {
        WriteContext::new(Principal::new("tester"), "mdm-tests")
    }

    fn engine_with(matcher: Arc<dyn RecordMatcher>) -> (Arc<RecordStore>, MdmEngine) {
        let store = Arc::new(RecordStore::new());
        let engine = MdmEngine::new(
            store.clone(),
            matcher,
            Arc::new(ReviewSink::new()),
            Arc::new(GrantAll),
        );
        (store, engine)
    }

    fn insert_patient(store: &RecordStore, given: &str, family: &str) -> RecordView {
        store
            .insert(
                RecordDraft::new(RecordClass::Patient).with_name(Name::simple(given, family)),
                &ctx(),
            )
            .unwrap()
    }

    #[test]
    fn no_match_creates_singleton_master() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let local = insert_patient(&store, "Ada", "Lovelace");
        let master = engine
            .on_record_written(&local, &ctx())
            .unwrap()
            .expect("a master");
        assert_eq!(store.head(master).unwrap().class, RecordClass::Master);
        assert_eq!(engine.members(master).unwrap(), vec![local.head.id]);
        assert_eq!(engine.master_of(local.head.id), Some(master));
    }

    #[test]
    fn probable_match_goes_to_review_unlinked() {
        let store = Arc::new(RecordStore::new());
        let review = Arc::new(ReviewSink::new());
        let engine = MdmEngine::new(
            store.clone(),
            Arc::new(Scripted::new(vec![MatchDecision::Probable])),
            review.clone(),
            Arc::new(GrantAll),
        );
        let local = insert_patient(&store, "Ada", "Lovelace");
        assert_eq!(engine.on_record_written(&local, &ctx()).unwrap(), None);
        assert_eq!(engine.master_of(local.head.id), None);
        assert_eq!(review.drain(), vec![local.head.id]);
    }

    #[test]
    fn match_links_into_existing_master() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let first = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&first, &ctx()).unwrap().unwrap();

        let engine2 = MdmEngine::new(
            store.clone(),
            Arc::new(Scripted::new(vec![MatchDecision::Match(master)])),
            Arc::new(ReviewSink::new()),
            Arc::new(GrantAll),
        );
        let second = insert_patient(&store, "A", "Lovelace");
        assert_eq!(
            engine2.on_record_written(&second, &ctx()).unwrap(),
            Some(master)
        );
        assert_eq!(
            engine2.members(master).unwrap(),
            vec![first.head.id, second.head.id]
        );
    }

    #[test]
    fn already_linked_local_is_not_rematched() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let local = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&local, &ctx()).unwrap().unwrap();
        // A rewrite of the same local keeps its link.
        assert_eq!(
            engine.on_record_written(&local, &ctx()).unwrap(),
            Some(master)
        );
        assert_eq!(store.count(RecordClass::Master), 1);
    }

    #[test]
    fn projection_merges_first_non_null_in_link_order() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = store
            .insert(
                RecordDraft::new(RecordClass::Patient)
                    .with_name(Name::simple("Ada", "Lovelace"))
                    .with_field("dob", json!("1815-12-10")),
                &ctx(),
            )
            .unwrap();
        let master = engine.on_record_written(&a, &ctx()).unwrap().unwrap();
        let b = store
            .insert(
                RecordDraft::new(RecordClass::Patient)
                    .with_field("dob", json!("1815-12-11"))
                    .with_field("gender", json!("female")),
                &ctx(),
            )
            .unwrap();
        engine.link_member(master, b.head.id, &ctx()).unwrap();

        let projection = engine.get_master(master, &Principal::new("reader")).unwrap();
        assert_eq!(projection.version.fields["dob"], json!("1815-12-10"));
        assert_eq!(projection.version.fields["gender"], json!("female"));
        assert_eq!(projection.names, vec![Name::simple("Ada", "Lovelace")]);
        assert_eq!(projection.tags.get("mdm.type").map(String::as_str), Some("M"));
    }

    #[test]
    fn record_of_truth_seeds_projection() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&a, &ctx()).unwrap().unwrap();
        let rot = store
            .insert(
                RecordDraft::new(RecordClass::Patient)
                    .with_name(Name::simple("Augusta Ada", "King"))
                    .with_field("dob", json!("1815-12-10")),
                &ctx(),
            )
            .unwrap();
        engine.link_member(master, rot.head.id, &ctx()).unwrap();
        engine
            .set_record_of_truth(master, rot.head.id, &ctx())
            .unwrap();

        let projection = engine.get_master(master, &Principal::new("reader")).unwrap();
        assert_eq!(projection.names, vec![Name::simple("Augusta Ada", "King")]);
    }

    #[test]
    fn second_record_of_truth_is_rejected() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&a, &ctx()).unwrap().unwrap();
        let b = insert_patient(&store, "A", "Lovelace");
        engine.link_member(master, b.head.id, &ctx()).unwrap();

        engine.set_record_of_truth(master, a.head.id, &ctx()).unwrap();
        let err = engine
            .set_record_of_truth(master, b.head.id, &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "mdm.rot.multiple");
    }

    #[test]
    fn record_of_truth_must_be_a_member() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&a, &ctx()).unwrap().unwrap();
        let outsider = insert_patient(&store, "Grace", "Hopper");
        let err = engine
            .set_record_of_truth(master, outsider.head.id, &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "mdm.rot.nonmember");
    }

    #[test]
    fn unlink_last_member_retires_master() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = insert_patient(&store, "Ada", "Lovelace");
        let old_master = engine.on_record_written(&a, &ctx()).unwrap().unwrap();

        let new_master = engine.unlink(a.head.id, None, &ctx()).unwrap();
        assert_ne!(new_master, old_master);
        assert!(store.head(old_master).unwrap().is_retired());
        assert_eq!(engine.master_of(a.head.id), Some(new_master));
    }

    #[test]
    fn unlink_into_target_master_moves_membership() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = insert_patient(&store, "Ada", "Lovelace");
        let b = insert_patient(&store, "Grace", "Hopper");
        let master_a = engine.on_record_written(&a, &ctx()).unwrap().unwrap();
        let master_b = engine.on_record_written(&b, &ctx()).unwrap().unwrap();

        let moved_to = engine.unlink(a.head.id, Some(master_b), &ctx()).unwrap();
        assert_eq!(moved_to, master_b);
        assert!(store.head(master_a).unwrap().is_retired());
        assert_eq!(
            engine.members(master_b).unwrap(),
            vec![b.head.id, a.head.id]
        );
    }

    #[test]
    fn unlink_into_current_master_is_rejected_before_detach() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&a, &ctx()).unwrap().unwrap();

        let err = engine.unlink(a.head.id, Some(master), &ctx()).unwrap_err();
        assert_eq!(err.code(), "mdm.unlink.destination");
        // Membership is untouched and the master stays live.
        assert_eq!(engine.master_of(a.head.id), Some(master));
        assert!(!store.head(master).unwrap().is_retired());
        assert_eq!(engine.members(master).unwrap(), vec![a.head.id]);
    }

    #[test]
    fn unlink_into_retired_master_keeps_current_link() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let a = insert_patient(&store, "Ada", "Lovelace");
        let b = insert_patient(&store, "Grace", "Hopper");
        let master_a = engine.on_record_written(&a, &ctx()).unwrap().unwrap();
        let old_master_b = engine.on_record_written(&b, &ctx()).unwrap().unwrap();

        // Moving b out retires its now-empty master.
        engine.unlink(b.head.id, None, &ctx()).unwrap();
        assert!(store.head(old_master_b).unwrap().is_retired());

        let err = engine
            .unlink(a.head.id, Some(old_master_b), &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "mdm.unlink.destination");
        // The local is never left without a live master.
        assert_eq!(engine.master_of(a.head.id), Some(master_a));
        assert_eq!(engine.members(master_a).unwrap(), vec![a.head.id]);
    }

    #[test]
    fn memberless_or_retired_master_is_not_found() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let empty = store
            .insert(RecordDraft::new(RecordClass::Master), &ctx())
            .unwrap();
        let err = engine
            .get_master(empty.head.id, &Principal::new("reader"))
            .unwrap_err();
        assert_eq!(err.code(), "store.notfound");
    }

    #[test]
    fn policy_guarded_member_is_excluded_unless_granted() {
        struct DenyAll;
        impl PolicyDecider for DenyAll {
            fn decide(&self, _p: &Principal, _policy: PolicyId) -> PolicyDecision {
                PolicyDecision::Deny
            }
        }

        let store = Arc::new(RecordStore::new());
        let engine = MdmEngine::new(
            store.clone(),
            Arc::new(NeverMatches),
            Arc::new(ReviewSink::new()),
            Arc::new(DenyAll),
        );
        let open = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&open, &ctx()).unwrap().unwrap();
        let guarded = store
            .insert(
                RecordDraft::new(RecordClass::Patient)
                    .with_field("dob", json!("1900-01-01"))
                    .with_policy(PolicyId::new(), false),
                &ctx(),
            )
            .unwrap();
        engine.link_member(master, guarded.head.id, &ctx()).unwrap();

        let projection = engine.get_master(master, &Principal::new("reader")).unwrap();
        assert!(!projection.version.fields.contains_key("dob"));
    }

    #[test]
    fn override_capable_policy_does_not_exclude() {
        struct DenyAll;
        impl PolicyDecider for DenyAll {
            fn decide(&self, _p: &Principal, _policy: PolicyId) -> PolicyDecision {
                PolicyDecision::Deny
            }
        }

        let store = Arc::new(RecordStore::new());
        let engine = MdmEngine::new(
            store.clone(),
            Arc::new(NeverMatches),
            Arc::new(ReviewSink::new()),
            Arc::new(DenyAll),
        );
        let open = insert_patient(&store, "Ada", "Lovelace");
        let master = engine.on_record_written(&open, &ctx()).unwrap().unwrap();
        let guarded = store
            .insert(
                RecordDraft::new(RecordClass::Patient)
                    .with_field("dob", json!("1900-01-01"))
                    .with_policy(PolicyId::new(), true),
                &ctx(),
            )
            .unwrap();
        engine.link_member(master, guarded.head.id, &ctx()).unwrap();

        let projection = engine.get_master(master, &Principal::new("reader")).unwrap();
        assert_eq!(projection.version.fields["dob"], json!("1900-01-01"));
    }

    #[test]
    fn master_writes_pass_through_untouched() {
        let (store, engine) = engine_with(Arc::new(NeverMatches));
        let master = store
            .insert(RecordDraft::new(RecordClass::Master), &ctx())
            .unwrap();
        assert_eq!(engine.on_record_written(&master, &ctx()).unwrap(), None);
        assert_eq!(store.count(RecordClass::Master), 1);
    }
}
