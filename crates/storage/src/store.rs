//! The record store: append-only version chains over in-process tables.

use crate::assoc::{reconcile, visible_values};
use crate::authority::{IdentityAuthority, RegisteredAuthority};
use crate::options::{AccessMode, StoreOptions};
use chrono::{DateTime, Utc};
use medley_core::{
    Address, AssocRow, AuthorityId, Generation, Identifier, MedleyError, MedleyResult, Name,
    PolicyGrant, Provenance, ProvenanceId, RecordClass, RecordDraft, RecordId, RecordView,
    Relationship, RelationshipKind, Version, VersionHead, VersionId, WriteContext,
};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Which version of a chain to read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VersionSelector {
    /// The version with no successor. O(1) via the current-version index.
    Current,
    /// The newest version whose sequence is `<=` the given generation.
    AsOfGeneration(Generation),
    /// The newest version created at or before the given instant.
    AsOfTime(DateTime<Utc>),
}

#[derive(Default)]
struct StoreInner {
    heads: FxHashMap<RecordId, VersionHead>,
    versions: FxHashMap<VersionId, Version>,
    /// Per-record chain, ascending by sequence.
    chains: FxHashMap<RecordId, Vec<VersionId>>,
    names: FxHashMap<RecordId, Vec<AssocRow<Name>>>,
    addresses: FxHashMap<RecordId, Vec<AssocRow<Address>>>,
    identifiers: FxHashMap<RecordId, Vec<AssocRow<Identifier>>>,
    relationships: FxHashMap<RecordId, Vec<AssocRow<Relationship>>>,
    policies: FxHashMap<RecordId, Vec<AssocRow<PolicyGrant>>>,
    tags: FxHashMap<RecordId, BTreeMap<String, String>>,
    provenance: FxHashMap<ProvenanceId, Provenance>,
    authorities: FxHashMap<AuthorityId, RegisteredAuthority>,
    /// (authority, value) → owning record, for uniqueness checks.
    identifier_index: FxHashMap<(AuthorityId, String), RecordId>,
}

impl StoreInner {
    fn view(&self, head: &VersionHead, version: &Version) -> RecordView {
        let at = version.sequence;
        RecordView {
            head: head.clone(),
            version: version.clone(),
            names: visible_values(self.names.get(&head.id).map_or(&[][..], Vec::as_slice), at),
            addresses: visible_values(
                self.addresses.get(&head.id).map_or(&[][..], Vec::as_slice),
                at,
            ),
            identifiers: visible_values(
                self.identifiers.get(&head.id).map_or(&[][..], Vec::as_slice),
                at,
            ),
            relationships: visible_values(
                self.relationships.get(&head.id).map_or(&[][..], Vec::as_slice),
                at,
            ),
            policies: visible_values(
                self.policies.get(&head.id).map_or(&[][..], Vec::as_slice),
                at,
            ),
            tags: self.tags.get(&head.id).cloned().unwrap_or_default(),
        }
    }

    fn record_provenance(&mut self, ctx: &WriteContext) {
        self.provenance
            .entry(ctx.provenance.id)
            .or_insert_with(|| ctx.provenance.clone());
    }

    /// Identifier uniqueness, format, and authority-scope checks for a
    /// draft. `owner` excludes the record's own index entries on update.
    fn check_identifiers(
        &self,
        draft: &[Identifier],
        class: RecordClass,
        owner: Option<RecordId>,
    ) -> MedleyResult<()> {
        for ident in draft {
            let authority = self.authorities.get(&ident.authority).ok_or_else(|| {
                MedleyError::constraint(
                    "identifier.authority",
                    format!("identifier names unregistered authority {}", ident.authority),
                )
            })?;
            authority.check(&ident.value, class)?;
            if let Some(holder) = self
                .identifier_index
                .get(&(ident.authority, ident.value.clone()))
            {
                if Some(*holder) != owner {
                    return Err(MedleyError::constraint(
                        "identifier.unique",
                        format!(
                            "identifier '{}' in authority '{}' already assigned",
                            ident.value, authority.authority.domain
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Drop and rebuild the identifier index entries for one record.
    fn reindex_identifiers(&mut self, id: RecordId, at: Generation) {
        self.identifier_index.retain(|_, holder| *holder != id);
        if let Some(rows) = self.identifiers.get(&id) {
            for row in rows.iter().filter(|r| r.visible_at(at)) {
                self.identifier_index
                    .insert((row.value.authority, row.value.value.clone()), id);
            }
        }
    }
}

/// Open association rows of one kind for a freshly inserted record. All rows
/// start at generation 1 with no close stamp.
fn open_rows<T>(owner: RecordId, values: Vec<T>) -> Vec<AssocRow<T>> {
    values
        .into_iter()
        .map(|v| AssocRow::open(owner, 1, v))
        .collect()
}

/// The versioned record store.
///
/// Cheap to share: wrap in an `Arc` and clone the handle. All writes are
/// serialized through the inner lock; readers take snapshot-consistent
/// clones.
pub struct RecordStore {
    inner: RwLock<StoreInner>,
    options: StoreOptions,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Create an empty read-write store.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::new())
    }

    /// Create a store with the given options.
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            options,
        }
    }

    fn check_writable(&self) -> MedleyResult<()> {
        match self.options.access_mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => Err(MedleyError::constraint(
                "store.readonly",
                "store was opened read-only",
            )),
        }
    }

    // =========================================================================
    // Authorities
    // =========================================================================

    /// Register an identity authority. Domain names are unique.
    pub fn register_authority(&self, authority: IdentityAuthority) -> MedleyResult<AuthorityId> {
        let mut inner = self.inner.write();
        if inner
            .authorities
            .values()
            .any(|a| a.authority.domain == authority.domain)
        {
            return Err(MedleyError::constraint(
                "authority.domain",
                format!("authority domain '{}' already registered", authority.domain),
            ));
        }
        let id = authority.id;
        let compiled = RegisteredAuthority::compile(authority)?;
        inner.authorities.insert(id, compiled);
        Ok(id)
    }

    /// Look up an authority key by domain name.
    pub fn authority_by_domain(&self, domain: &str) -> Option<AuthorityId> {
        self.inner
            .read()
            .authorities
            .values()
            .find(|a| a.authority.domain == domain)
            .map(|a| a.authority.id)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert a new logical record.
    ///
    /// Assigns a key if the draft carries none, allocates sequence 1 with no
    /// replaces-pointer, and opens all association rows at the new
    /// generation. Identifier uniqueness/format/authority-scope breaches
    /// fail with a `Constraint` error.
    pub fn insert(&self, draft: RecordDraft, ctx: &WriteContext) -> MedleyResult<RecordView> {
        self.check_writable()?;
        let class = draft
            .class
            .ok_or_else(|| MedleyError::constraint("record.class", "draft carries no class"))?;
        let mut inner = self.inner.write();

        let id = draft.id.unwrap_or_default();
        if inner.heads.contains_key(&id) {
            return Err(MedleyError::constraint(
                "record.exists",
                format!("record {id} already exists; use update"),
            ));
        }
        inner.check_identifiers(&draft.identifiers, class, None)?;
        inner.record_provenance(ctx);

        let now = Utc::now();
        let version = Version {
            id: VersionId::new(),
            record: id,
            sequence: 1,
            replaces: None,
            created_at: now,
            provenance: ctx.provenance.id,
            obsoleted_at: None,
            fields: draft.fields,
        };
        let head = VersionHead {
            id,
            class,
            created_at: now,
            created_by: ctx.provenance.id,
            obsoleted_at: None,
            obsoleted_by: None,
            current: version.id,
            generation: 1,
        };

        inner.names.insert(id, open_rows(id, draft.names));
        inner.addresses.insert(id, open_rows(id, draft.addresses));
        inner.identifiers.insert(id, open_rows(id, draft.identifiers));
        inner.relationships.insert(id, open_rows(id, draft.relationships));
        inner.policies.insert(id, open_rows(id, draft.policies));
        inner.reindex_identifiers(id, 1);

        inner.chains.insert(id, vec![version.id]);
        inner.versions.insert(version.id, version.clone());
        inner.heads.insert(id, head.clone());

        debug!(record = %id, class = %class, "inserted record");
        Ok(inner.view(&head, &version))
    }

    /// Append a new version of an existing record.
    ///
    /// `expected` must equal the stored current version; a stale value fails
    /// with `OptimisticConcurrency` and nothing is written. Changed or
    /// removed associations are closed at the new generation; unchanged rows
    /// stay open (copy-on-write).
    pub fn update(
        &self,
        draft: RecordDraft,
        expected: VersionId,
        ctx: &WriteContext,
    ) -> MedleyResult<RecordView> {
        self.check_writable()?;
        let id = draft
            .id
            .ok_or_else(|| MedleyError::constraint("record.key", "update draft carries no key"))?;
        let mut inner = self.inner.write();

        let head = inner
            .heads
            .get(&id)
            .ok_or_else(|| MedleyError::not_found(format!("record {id}")))?
            .clone();
        if head.is_retired() {
            return Err(MedleyError::business_rule(
                "record.retired",
                format!("record {id} has been obsoleted"),
            ));
        }
        if head.current != expected {
            return Err(MedleyError::stale_version(expected, head.current));
        }
        if let Some(class) = draft.class {
            if class != head.class {
                return Err(MedleyError::constraint(
                    "record.class",
                    format!("record class is immutable ({} -> {class})", head.class),
                ));
            }
        }
        inner.check_identifiers(&draft.identifiers, head.class, Some(id))?;
        inner.record_provenance(ctx);

        let old_gen = head.generation;
        let new_gen = old_gen + 1;
        let version = Version {
            id: VersionId::new(),
            record: id,
            sequence: new_gen,
            replaces: Some(head.current),
            created_at: Utc::now(),
            provenance: ctx.provenance.id,
            obsoleted_at: None,
            fields: draft.fields,
        };

        reconcile(
            inner.names.entry(id).or_default(),
            id,
            old_gen,
            new_gen,
            &draft.names,
        );
        reconcile(
            inner.addresses.entry(id).or_default(),
            id,
            old_gen,
            new_gen,
            &draft.addresses,
        );
        reconcile(
            inner.identifiers.entry(id).or_default(),
            id,
            old_gen,
            new_gen,
            &draft.identifiers,
        );
        reconcile(
            inner.relationships.entry(id).or_default(),
            id,
            old_gen,
            new_gen,
            &draft.relationships,
        );
        reconcile(
            inner.policies.entry(id).or_default(),
            id,
            old_gen,
            new_gen,
            &draft.policies,
        );
        inner.reindex_identifiers(id, new_gen);

        let mut head = head;
        head.current = version.id;
        head.generation = new_gen;
        inner.chains.entry(id).or_default().push(version.id);
        inner.versions.insert(version.id, version.clone());
        inner.heads.insert(id, head.clone());

        debug!(record = %id, generation = new_gen, "updated record");
        Ok(inner.view(&head, &version))
    }

    /// Retire a record by appending a terminal version stamped with
    /// obsoletion time and provenance. Prior versions remain in the chain.
    pub fn obsolete(&self, id: RecordId, ctx: &WriteContext) -> MedleyResult<RecordView> {
        self.check_writable()?;
        let mut inner = self.inner.write();

        let head = inner
            .heads
            .get(&id)
            .ok_or_else(|| MedleyError::not_found(format!("record {id}")))?
            .clone();
        if head.is_retired() {
            return Err(MedleyError::business_rule(
                "record.retired",
                format!("record {id} is already obsolete"),
            ));
        }
        inner.record_provenance(ctx);

        let now = Utc::now();
        let current_fields = inner
            .versions
            .get(&head.current)
            .map(|v| v.fields.clone())
            .unwrap_or_default();
        let version = Version {
            id: VersionId::new(),
            record: id,
            sequence: head.generation + 1,
            replaces: Some(head.current),
            created_at: now,
            provenance: ctx.provenance.id,
            obsoleted_at: Some(now),
            fields: current_fields,
        };

        let mut head = head;
        head.obsoleted_at = Some(now);
        head.obsoleted_by = Some(ctx.provenance.id);
        head.current = version.id;
        head.generation = version.sequence;
        inner.chains.entry(id).or_default().push(version.id);
        inner.versions.insert(version.id, version.clone());
        inner.heads.insert(id, head.clone());

        debug!(record = %id, "obsoleted record");
        Ok(inner.view(&head, &version))
    }

    /// Replace a record tag value, creating it if absent. Tags live outside
    /// the version chain.
    pub fn set_tag(
        &self,
        id: RecordId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> MedleyResult<()> {
        self.check_writable()?;
        let mut inner = self.inner.write();
        if !inner.heads.contains_key(&id) {
            return Err(MedleyError::not_found(format!("record {id}")));
        }
        inner
            .tags
            .entry(id)
            .or_default()
            .insert(key.into(), value.into());
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read a record at the selected version.
    pub fn get_version(&self, id: RecordId, selector: VersionSelector) -> MedleyResult<RecordView> {
        let inner = self.inner.read();
        let head = inner
            .heads
            .get(&id)
            .ok_or_else(|| MedleyError::not_found(format!("record {id}")))?;
        let version_id = match selector {
            VersionSelector::Current => head.current,
            VersionSelector::AsOfGeneration(g) => {
                let chain = inner.chains.get(&id).map_or(&[][..], Vec::as_slice);
                *chain
                    .iter()
                    .rev()
                    .find(|vid| {
                        inner
                            .versions
                            .get(vid)
                            .map_or(false, |v| v.sequence <= g)
                    })
                    .ok_or_else(|| {
                        MedleyError::not_found(format!("record {id} at generation {g}"))
                    })?
            }
            VersionSelector::AsOfTime(t) => {
                let chain = inner.chains.get(&id).map_or(&[][..], Vec::as_slice);
                *chain
                    .iter()
                    .rev()
                    .find(|vid| {
                        inner
                            .versions
                            .get(vid)
                            .map_or(false, |v| v.created_at <= t)
                    })
                    .ok_or_else(|| MedleyError::not_found(format!("record {id} as of {t}")))?
            }
        };
        let version = inner
            .versions
            .get(&version_id)
            .ok_or_else(|| MedleyError::not_found(format!("version {version_id}")))?;
        Ok(inner.view(head, version))
    }

    /// Read the current version of a record.
    pub fn get_current(&self, id: RecordId) -> MedleyResult<RecordView> {
        self.get_version(id, VersionSelector::Current)
    }

    /// The full chain of a record, ascending by sequence.
    pub fn versions(&self, id: RecordId) -> MedleyResult<Vec<Version>> {
        let inner = self.inner.read();
        let chain = inner
            .chains
            .get(&id)
            .ok_or_else(|| MedleyError::not_found(format!("record {id}")))?;
        Ok(chain
            .iter()
            .filter_map(|vid| inner.versions.get(vid).cloned())
            .collect())
    }

    /// The root row of a record, if it exists.
    pub fn head(&self, id: RecordId) -> Option<VersionHead> {
        self.inner.read().heads.get(&id).cloned()
    }

    /// A provenance row by key.
    pub fn provenance(&self, id: ProvenanceId) -> Option<Provenance> {
        self.inner.read().provenance.get(&id).cloned()
    }

    /// All root rows of one record family.
    pub fn heads_of_class(&self, class: RecordClass) -> Vec<VersionHead> {
        let inner = self.inner.read();
        let mut heads: Vec<_> = inner
            .heads
            .values()
            .filter(|h| h.class == class)
            .cloned()
            .collect();
        heads.sort_by_key(|h| h.id);
        heads
    }

    /// Number of live (non-retired) records in a family.
    pub fn count(&self, class: RecordClass) -> usize {
        self.inner
            .read()
            .heads
            .values()
            .filter(|h| h.class == class && !h.is_retired())
            .count()
    }

    /// Records owning a relationship of the given kind pointing at `target`,
    /// visible at each owner's current generation.
    pub fn relations_to(&self, target: RecordId, kind: &RelationshipKind) -> Vec<RecordId> {
        let inner = self.inner.read();
        let mut owners: Vec<_> = inner
            .relationships
            .iter()
            .filter(|(owner, rows)| {
                let at = inner.heads.get(owner).map_or(0, |h| h.generation);
                rows.iter().any(|r| {
                    r.visible_at(at) && r.value.target == target && &r.value.kind == kind
                })
            })
            .map(|(owner, _)| *owner)
            .collect();
        owners.sort();
        owners
    }

    // Raw association rows, for the query executor. Clones.

    /// Name rows of a record, with windows.
    pub fn name_rows(&self, id: RecordId) -> Vec<AssocRow<Name>> {
        self.inner.read().names.get(&id).cloned().unwrap_or_default()
    }

    /// Address rows of a record, with windows.
    pub fn address_rows(&self, id: RecordId) -> Vec<AssocRow<Address>> {
        self.inner
            .read()
            .addresses
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Identifier rows of a record, with windows.
    pub fn identifier_rows(&self, id: RecordId) -> Vec<AssocRow<Identifier>> {
        self.inner
            .read()
            .identifiers
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Relationship rows of a record, with windows.
    pub fn relationship_rows(&self, id: RecordId) -> Vec<AssocRow<Relationship>> {
        self.inner
            .read()
            .relationships
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// The version of a record in effect at the given generation.
    pub fn version_at(&self, id: RecordId, generation: Generation) -> Option<Version> {
        let inner = self.inner.read();
        let chain = inner.chains.get(&id)?;
        chain
            .iter()
            .rev()
            .filter_map(|vid| inner.versions.get(vid))
            .find(|v| v.sequence <= generation)
            .cloned()
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("RecordStore")
            .field("records", &inner.heads.len())
            .field("versions", &inner.versions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_core::Principal;
    use std::sync::Arc;

    fn ctx() -> WriteContext {
        WriteContext::new(Principal::new("tester"), "unit-tests")
    }

    fn patient(given: &str, family: &str) -> RecordDraft {
        RecordDraft::new(RecordClass::Patient).with_name(Name::simple(given, family))
    }

    #[test]
    fn insert_starts_chain_at_sequence_one() {
        let store = RecordStore::new();
        let view = store.insert(patient("Ada", "Lovelace"), &ctx()).unwrap();
        assert_eq!(view.version.sequence, 1);
        assert!(view.version.replaces.is_none());
        assert_eq!(view.head.current, view.version.id);
    }

    #[test]
    fn insert_opens_rows_in_every_association_table() {
        let store = RecordStore::new();
        let c = ctx();
        let mrn = store.register_authority(IdentityAuthority::new("MRN")).unwrap();
        let other = store.insert(patient("C", "D"), &c).unwrap();

        let home = Address {
            use_code: "home".to_string(),
            components: Default::default(),
        };
        let view = store
            .insert(
                patient("A", "B")
                    .with_address(home)
                    .with_identifier(mrn, "42")
                    .with_relationship(RelationshipKind::Duplicate, other.head.id)
                    .with_policy(medley_core::PolicyId::new(), false),
                &c,
            )
            .unwrap();

        assert_eq!(view.names.len(), 1);
        assert_eq!(view.addresses.len(), 1);
        assert_eq!(view.identifiers.len(), 1);
        assert_eq!(view.relationships.len(), 1);
        assert_eq!(view.policies.len(), 1);

        // Every row starts its window at generation 1 and stays open.
        let id = view.head.id;
        assert_eq!(store.name_rows(id)[0].window.effective, 1);
        assert!(store.address_rows(id)[0].window.is_open());
        assert_eq!(store.identifier_rows(id)[0].window.effective, 1);
        assert!(store.relationship_rows(id)[0].window.is_open());
    }

    #[test]
    fn update_links_replaces_pointer_and_preserves_prior_version() {
        let store = RecordStore::new();
        let c = ctx();
        let v1 = store.insert(patient("Ada", "Lovelace"), &c).unwrap();

        let mut draft = v1.draft();
        draft.names = vec![Name::simple("Ada", "King")];
        let v2 = store.update(draft, v1.version.id, &c).unwrap();

        assert_eq!(v2.version.sequence, 2);
        assert_eq!(v2.version.replaces, Some(v1.version.id));

        // Prior version unchanged in the chain.
        let chain = store.versions(v1.head.id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, v1.version.id);
        assert!(chain[0].replaces.is_none());
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = RecordStore::new();
        let c = ctx();
        let v1 = store.insert(patient("Ada", "Lovelace"), &c).unwrap();
        let v2 = store.update(v1.draft(), v1.version.id, &c).unwrap();

        // A second writer still holding v1 loses.
        let err = store.update(v1.draft(), v1.version.id, &c).unwrap_err();
        match err {
            MedleyError::OptimisticConcurrency { expected, found } => {
                assert_eq!(expected, v1.version.id);
                assert_eq!(found, v2.version.id);
            }
            other => panic!("expected concurrency error, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_updates_produce_exactly_one_winner() {
        let store = Arc::new(RecordStore::new());
        let c = ctx();
        let v1 = store.insert(patient("Ada", "Lovelace"), &c).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let base = v1.draft();
                let expected = v1.version.id;
                std::thread::spawn(move || {
                    let c = ctx();
                    store.update(base, expected, &c).is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn unchanged_association_keeps_row_across_update() {
        let store = RecordStore::new();
        let c = ctx();
        let v1 = store.insert(patient("Ada", "Lovelace"), &c).unwrap();
        let id = v1.head.id;
        let row_before = store.name_rows(id)[0].id;

        let v2 = store.update(v1.draft(), v1.version.id, &c).unwrap();
        assert_eq!(v2.names, v1.names);
        assert_eq!(store.name_rows(id)[0].id, row_before);
        assert!(store.name_rows(id)[0].window.is_open());
    }

    #[test]
    fn changed_association_is_closed_and_visible_historically() {
        let store = RecordStore::new();
        let c = ctx();
        let v1 = store.insert(patient("Ada", "Lovelace"), &c).unwrap();
        let id = v1.head.id;

        let mut draft = v1.draft();
        draft.names = vec![Name::simple("Ada", "King")];
        store.update(draft, v1.version.id, &c).unwrap();

        let old = store
            .get_version(id, VersionSelector::AsOfGeneration(1))
            .unwrap();
        assert_eq!(
            old.names[0].component_values(medley_core::ComponentKind::Family).next(),
            Some("Lovelace")
        );
        let new = store.get_current(id).unwrap();
        assert_eq!(
            new.names[0].component_values(medley_core::ComponentKind::Family).next(),
            Some("King")
        );
    }

    #[test]
    fn obsolete_appends_terminal_version_and_retires_head() {
        let store = RecordStore::new();
        let c = ctx();
        let v1 = store.insert(patient("Ada", "Lovelace"), &c).unwrap();
        let view = store.obsolete(v1.head.id, &c).unwrap();

        assert!(view.head.is_retired());
        assert!(view.version.obsoleted_at.is_some());
        assert_eq!(view.version.replaces, Some(v1.version.id));
        assert_eq!(store.versions(v1.head.id).unwrap().len(), 2);

        let err = store.obsolete(v1.head.id, &c).unwrap_err();
        assert_eq!(err.code(), "record.retired");
    }

    #[test]
    fn identifier_uniqueness_is_enforced_per_authority() {
        let store = RecordStore::new();
        let c = ctx();
        let mrn = store
            .register_authority(IdentityAuthority::new("MRN").with_format(r"\d{4}"))
            .unwrap();

        store
            .insert(patient("A", "B").with_identifier(mrn, "1234"), &c)
            .unwrap();
        let err = store
            .insert(patient("C", "D").with_identifier(mrn, "1234"), &c)
            .unwrap_err();
        assert_eq!(err.code(), "identifier.unique");

        let err = store
            .insert(patient("E", "F").with_identifier(mrn, "12AB"), &c)
            .unwrap_err();
        assert_eq!(err.code(), "identifier.format");
    }

    #[test]
    fn update_may_keep_its_own_identifier() {
        let store = RecordStore::new();
        let c = ctx();
        let mrn = store.register_authority(IdentityAuthority::new("MRN")).unwrap();
        let v1 = store
            .insert(patient("A", "B").with_identifier(mrn, "77"), &c)
            .unwrap();
        // Same identifier resubmitted by the same record is not a breach.
        assert!(store.update(v1.draft(), v1.version.id, &c).is_ok());
    }

    #[test]
    fn unknown_authority_is_rejected() {
        let store = RecordStore::new();
        let err = store
            .insert(
                patient("A", "B").with_identifier(AuthorityId::new(), "x"),
                &ctx(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "identifier.authority");
    }

    #[test]
    fn as_of_time_selector_walks_the_chain() {
        let store = RecordStore::new();
        let c = ctx();
        let v1 = store.insert(patient("A", "B"), &c).unwrap();
        let between = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.update(v1.draft(), v1.version.id, &c).unwrap();

        let at = store
            .get_version(v1.head.id, VersionSelector::AsOfTime(between))
            .unwrap();
        assert_eq!(at.version.id, v1.version.id);
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let store = RecordStore::with_options(StoreOptions::new().access_mode(AccessMode::ReadOnly));
        let err = store.insert(patient("A", "B"), &ctx()).unwrap_err();
        assert_eq!(err.code(), "store.readonly");
    }

    #[test]
    fn tags_replace_by_key() {
        let store = RecordStore::new();
        let c = ctx();
        let v1 = store.insert(patient("A", "B"), &c).unwrap();
        store.set_tag(v1.head.id, "mdm.type", "L").unwrap();
        store.set_tag(v1.head.id, "mdm.type", "M").unwrap();
        let view = store.get_current(v1.head.id).unwrap();
        assert_eq!(view.tags.get("mdm.type").map(String::as_str), Some("M"));
    }

    #[test]
    fn relations_to_sees_only_open_rows() {
        let store = RecordStore::new();
        let c = ctx();
        let local = store.insert(patient("A", "B"), &c).unwrap();
        let master = store
            .insert(
                RecordDraft::new(RecordClass::Master)
                    .with_relationship(RelationshipKind::Member, local.head.id),
                &c,
            )
            .unwrap();
        assert_eq!(
            store.relations_to(local.head.id, &RelationshipKind::Member),
            vec![master.head.id]
        );

        // Unlink by updating the master without the member row.
        let mut draft = master.draft();
        draft.relationships.clear();
        store.update(draft, master.version.id, &c).unwrap();
        assert!(store
            .relations_to(local.head.id, &RelationshipKind::Member)
            .is_empty());
    }
}
