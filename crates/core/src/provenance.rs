//! Provenance: one immutable row per write context.
//!
//! Every insert, update, and obsoletion is stamped with exactly one
//! provenance key identifying the acting user, application, device, and
//! session. Provenance rows are never mutated after creation.

use crate::principal::Principal;
use crate::types::ProvenanceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable record of who performed a write and in what context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Key of this provenance row.
    pub id: ProvenanceId,
    /// Acting user, if any.
    pub user: Option<String>,
    /// Acting application.
    pub application: String,
    /// Acting device, if any.
    pub device: Option<String>,
    /// Session identifier, if any.
    pub session: Option<String>,
    /// When the row was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// The context carried through one logical write operation.
///
/// Contexts are constructed at the entry point and passed explicitly into
/// every store call; they are scoped to one operation and never shared
/// across concurrent callers.
#[derive(Debug, Clone)]
pub struct WriteContext {
    /// The principal performing the operation.
    pub principal: Principal,
    /// The provenance row stamped onto writes made under this context.
    pub provenance: Provenance,
}

impl WriteContext {
    /// Build a context for the given principal and application name. A fresh
    /// provenance row is allocated; the store persists it on first use.
    pub fn new(principal: Principal, application: impl Into<String>) -> Self {
        let provenance = Provenance {
            id: ProvenanceId::new(),
            user: Some(principal.name.clone()),
            application: application.into(),
            device: None,
            session: None,
            recorded_at: Utc::now(),
        };
        Self {
            principal,
            provenance,
        }
    }

    /// Attach a device identifier to the provenance row.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.provenance.device = Some(device.into());
        self
    }

    /// Attach a session identifier to the provenance row.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.provenance.session = Some(session.into());
        self
    }
}
