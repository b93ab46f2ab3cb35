//! The versioned record model.
//!
//! A logical record is a chain of immutable versions linked by
//! `replaces` back-pointers; exactly one version per chain has no successor
//! ("current"). Associations (names, addresses, identifiers, links) are rows
//! owned by the logical record and carry a two-integer validity window in
//! version-sequence space: a row is visible at generation `V` iff
//! `effective <= V` and `obsolete` is unset or `> V`. Rows are closed by
//! stamping `obsolete`, never deleted, so visibility composes with
//! chain traversal.

use crate::types::{
    AssociationId, AuthorityId, Generation, PolicyId, ProvenanceId, RecordClass, RecordId,
    VersionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Dynamic field bag of a version. Ordered so projections are deterministic.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// The validity window of an association row, in version-sequence space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// First generation at which the row is visible.
    pub effective: Generation,
    /// First generation at which the row is no longer visible, if closed.
    pub obsolete: Option<Generation>,
}

impl Window {
    /// An open window starting at `effective`.
    pub fn open(effective: Generation) -> Self {
        Self {
            effective,
            obsolete: None,
        }
    }

    /// Whether the row is visible at generation `v`.
    pub fn visible_at(&self, v: Generation) -> bool {
        self.effective <= v && self.obsolete.map_or(true, |o| o > v)
    }

    /// Whether the window has not been closed.
    pub fn is_open(&self) -> bool {
        self.obsolete.is_none()
    }

    /// Close the window at generation `v`. A window never closes before it
    /// became effective.
    pub fn close(&mut self, v: Generation) {
        debug_assert!(v >= self.effective, "window closed before effective");
        self.obsolete = Some(v.max(self.effective));
    }
}

/// A component of a name or address (e.g. one given name, one city line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameComponent {
    /// What part this component is.
    pub kind: ComponentKind,
    /// The component text.
    pub value: String,
}

/// Discriminator for name and address components. Guards in query
/// predicates resolve symbolic names to these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// A given (first/middle) name.
    Given,
    /// A family (last) name.
    Family,
    /// A name prefix (title).
    Prefix,
    /// A name suffix.
    Suffix,
    /// Street address line.
    Street,
    /// City.
    City,
    /// State or region.
    State,
    /// Postal code.
    PostalCode,
    /// Country.
    Country,
}

/// A name carried by a record. To-many: a record may have several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Name {
    /// Use label (e.g. "official", "maiden", "alias").
    pub use_code: String,
    /// Ordered components.
    pub components: SmallVec<[NameComponent; 4]>,
}

impl Name {
    /// Convenience constructor for an "official" given+family name.
    pub fn simple(given: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            use_code: "official".to_string(),
            components: smallvec::smallvec![
                NameComponent {
                    kind: ComponentKind::Given,
                    value: given.into(),
                },
                NameComponent {
                    kind: ComponentKind::Family,
                    value: family.into(),
                },
            ],
        }
    }

    /// Values of all components of the given kind.
    pub fn component_values(&self, kind: ComponentKind) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .filter(move |c| c.kind == kind)
            .map(|c| c.value.as_str())
    }
}

/// An address carried by a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// Use label (e.g. "home", "work").
    pub use_code: String,
    /// Ordered components.
    pub components: SmallVec<[NameComponent; 4]>,
}

/// A business identifier issued by an authority (e.g. an MRN).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// The issuing authority.
    pub authority: AuthorityId,
    /// The identifier value within that authority's domain.
    pub value: String,
}

/// A directed link from the owning record to another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// The link kind.
    pub kind: RelationshipKind,
    /// The target record.
    pub target: RecordId,
}

/// Link kinds. `Member` and `RecordOfTruth` are owned by master records and
/// drive MDM synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Master → local membership link.
    Member,
    /// Master → preferred local record.
    RecordOfTruth,
    /// Marked-duplicate link.
    Duplicate,
    /// Any other labelled relationship.
    Other(String),
}

/// A security policy attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyGrant {
    /// The attached policy.
    pub policy: PolicyId,
    /// Whether an `Elevate` decision may override a non-grant.
    pub override_capable: bool,
}

/// One association row: a value plus its owner and validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssocRow<T> {
    /// Row key.
    pub id: AssociationId,
    /// Owning logical record.
    pub owner: RecordId,
    /// Validity window in the owner's version-sequence space.
    pub window: Window,
    /// The association payload.
    pub value: T,
}

impl<T> AssocRow<T> {
    /// Open a new row at the given generation.
    pub fn open(owner: RecordId, effective: Generation, value: T) -> Self {
        Self {
            id: AssociationId::new(),
            owner,
            window: Window::open(effective),
            value,
        }
    }

    /// Whether this row is visible at generation `v`.
    pub fn visible_at(&self, v: Generation) -> bool {
        self.window.visible_at(v)
    }
}

/// Root row of a logical record: identity, lifecycle stamps, and the
/// current-version pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHead {
    /// Stable logical key.
    pub id: RecordId,
    /// Record family.
    pub class: RecordClass,
    /// Creation stamp.
    pub created_at: DateTime<Utc>,
    /// Provenance of the creating write.
    pub created_by: ProvenanceId,
    /// Obsoletion stamp, if retired.
    pub obsoleted_at: Option<DateTime<Utc>>,
    /// Provenance of the obsoleting write, if retired.
    pub obsoleted_by: Option<ProvenanceId>,
    /// The version with no successor.
    pub current: VersionId,
    /// Sequence number of the current version.
    pub generation: Generation,
}

impl VersionHead {
    /// Whether the logical record has been obsoleted.
    pub fn is_retired(&self) -> bool {
        self.obsoleted_at.is_some()
    }
}

/// One immutable version in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// Version key.
    pub id: VersionId,
    /// Owning logical record.
    pub record: RecordId,
    /// Monotonic per-record sequence, starting at 1.
    pub sequence: Generation,
    /// The version this one replaces; `None` only for the first version.
    pub replaces: Option<VersionId>,
    /// Creation stamp.
    pub created_at: DateTime<Utc>,
    /// Provenance of the creating write.
    pub provenance: ProvenanceId,
    /// Obsoletion stamp, set only on a terminal version.
    pub obsoleted_at: Option<DateTime<Utc>>,
    /// The field bag of this version.
    pub fields: FieldMap,
}

/// What a caller submits to `insert`/`update`: the desired state of a
/// record, without version bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    /// Logical key; assigned by the store when absent.
    pub id: Option<RecordId>,
    /// Record family.
    pub class: Option<RecordClass>,
    /// Field bag.
    pub fields: FieldMap,
    /// Names.
    pub names: Vec<Name>,
    /// Addresses.
    pub addresses: Vec<Address>,
    /// Business identifiers.
    pub identifiers: Vec<Identifier>,
    /// Relationships.
    pub relationships: Vec<Relationship>,
    /// Attached security policies.
    pub policies: Vec<PolicyGrant>,
}

impl RecordDraft {
    /// Start a draft for the given class.
    pub fn new(class: RecordClass) -> Self {
        Self {
            class: Some(class),
            ..Self::default()
        }
    }

    /// Use a caller-chosen logical key.
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set a field value.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Add a name.
    pub fn with_name(mut self, name: Name) -> Self {
        self.names.push(name);
        self
    }

    /// Add an address.
    pub fn with_address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    /// Add a business identifier.
    pub fn with_identifier(mut self, authority: AuthorityId, value: impl Into<String>) -> Self {
        self.identifiers.push(Identifier {
            authority,
            value: value.into(),
        });
        self
    }

    /// Add a relationship.
    pub fn with_relationship(mut self, kind: RelationshipKind, target: RecordId) -> Self {
        self.relationships.push(Relationship { kind, target });
        self
    }

    /// Attach a security policy.
    pub fn with_policy(mut self, policy: PolicyId, override_capable: bool) -> Self {
        self.policies.push(PolicyGrant {
            policy,
            override_capable,
        });
        self
    }
}

/// A materialized read of one record at one generation: head, version, and
/// the associations visible at that generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    /// Root row.
    pub head: VersionHead,
    /// The version read.
    pub version: Version,
    /// Visible names.
    pub names: Vec<Name>,
    /// Visible addresses.
    pub addresses: Vec<Address>,
    /// Visible identifiers.
    pub identifiers: Vec<Identifier>,
    /// Visible relationships.
    pub relationships: Vec<Relationship>,
    /// Attached policies.
    pub policies: Vec<PolicyGrant>,
    /// Record tags (not versioned).
    pub tags: BTreeMap<String, String>,
}

impl RecordView {
    /// Rebuild a draft from this view, for read-modify-write updates.
    pub fn draft(&self) -> RecordDraft {
        RecordDraft {
            id: Some(self.head.id),
            class: Some(self.head.class),
            fields: self.version.fields.clone(),
            names: self.names.clone(),
            addresses: self.addresses.clone(),
            identifiers: self.identifiers.clone(),
            relationships: self.relationships.clone(),
            policies: self.policies.clone(),
        }
    }
}
