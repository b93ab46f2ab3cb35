//! Core types for the Medley health-exchange data platform.
//!
//! This crate defines the shared vocabulary of the workspace: identifier
//! newtypes, the versioned record model with its two-integer association
//! validity windows, provenance and write-context types, the principal and
//! policy-decision contracts, and the workspace error taxonomy.
//!
//! Nothing here touches storage; higher crates (`medley-storage`,
//! `medley-query`, `medley-mdm`) build on these definitions.

pub mod error;
pub mod principal;
pub mod provenance;
pub mod record;
pub mod types;

pub use error::{ErrorDetail, MedleyError, MedleyResult, Severity};
pub use principal::{GrantAll, PolicyDecider, PolicyDecision, Principal};
pub use provenance::{Provenance, WriteContext};
pub use record::{
    Address, AssocRow, ComponentKind, FieldMap, Identifier, Name, NameComponent, PolicyGrant,
    RecordDraft, RecordView, Relationship, RelationshipKind, Version, VersionHead, Window,
};
pub use types::{
    AssociationId, AuthorityId, Generation, PolicyId, ProvenanceId, QueryId, RecordClass,
    RecordId, VersionId,
};
