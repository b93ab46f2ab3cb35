//! Identifier newtypes and small shared enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-record version sequence number. Generation 1 is the first version of
/// a logical record; association validity windows are expressed in this
/// space, not in wall-clock time.
pub type Generation = u64;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The nil identifier (all zeros). Used as a sentinel in tests.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype! {
    /// Stable logical key of a record. Shared by all versions in a chain.
    RecordId
}
id_newtype! {
    /// Key of one version row in a chain.
    VersionId
}
id_newtype! {
    /// Key of one association row (name, address, identifier, link).
    AssociationId
}
id_newtype! {
    /// Key of an immutable provenance row.
    ProvenanceId
}
id_newtype! {
    /// Key of a security policy.
    PolicyId
}
id_newtype! {
    /// Key of an identity-assigning authority.
    AuthorityId
}
id_newtype! {
    /// Key of a registered continuation query set.
    QueryId
}

/// The record families the store manages. One root+version table pair exists
/// per class; `Master` is the reserved class for MDM aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordClass {
    /// A patient subject record.
    Patient,
    /// A healthcare provider record.
    Provider,
    /// A physical place (facility, ward).
    Place,
    /// An organization.
    Organization,
    /// A material or device.
    Material,
    /// The reserved MDM aggregate class.
    Master,
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordClass::Patient => "patient",
            RecordClass::Provider => "provider",
            RecordClass::Place => "place",
            RecordClass::Organization => "organization",
            RecordClass::Material => "material",
            RecordClass::Master => "master",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(RecordId::new(), RecordId::new());
        assert_ne!(VersionId::new(), VersionId::new());
    }

    #[test]
    fn nil_id_is_stable() {
        assert_eq!(RecordId::nil(), RecordId::nil());
        assert_eq!(RecordId::nil().to_string(), Uuid::nil().to_string());
    }

    #[test]
    fn record_class_display_is_lowercase() {
        assert_eq!(RecordClass::Patient.to_string(), "patient");
        assert_eq!(RecordClass::Master.to_string(), "master");
    }

    #[test]
    fn serde_roundtrip_record_id() {
        let id = RecordId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
