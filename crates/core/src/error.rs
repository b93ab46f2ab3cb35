//! Workspace error taxonomy.
//!
//! Store-level failures are translated into this small structured set before
//! they leave a crate boundary; raw backing-store errors never escape.
//! Every variant maps to a stable code and a [`Severity`] so an outer
//! protocol layer can distinguish client-correctable conditions (bad filter,
//! stale version) from programming defects (unmapped path).

use crate::types::VersionId;
use thiserror::Error;

/// Result type alias used across the workspace.
pub type MedleyResult<T> = std::result::Result<T, MedleyError>;

/// How serious an error is from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected condition (e.g. lookup miss); not a fault.
    Informational,
    /// Recoverable by retrying from fresh state (e.g. a lost version race).
    Warning,
    /// Client-correctable fault (bad input, rule violation).
    Error,
    /// Programming defect; must surface, never be swallowed.
    Fatal,
}

/// Structured error detail handed to outer protocol layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Severity classification.
    pub severity: Severity,
}

/// Error type for all Medley core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MedleyError {
    /// Identifier uniqueness, format, or authority-scope breach.
    #[error("constraint violated ({code}): {message}")]
    Constraint {
        /// Stable constraint code, e.g. `identifier.unique`.
        code: String,
        /// Description of the breach.
        message: String,
    },

    /// A property path with no registered model-to-table mapping. Always a
    /// programming error; never caught silently.
    #[error("no query mapping for property path '{path}'")]
    QueryMapping {
        /// The unmapped path as written.
        path: String,
    },

    /// The caller's expected version is no longer current.
    #[error("stale version: expected current {expected}, found {found}")]
    OptimisticConcurrency {
        /// Version the caller believed was current.
        expected: VersionId,
        /// Version actually current at write time.
        found: VersionId,
    },

    /// A domain rule was violated (e.g. a second record-of-truth).
    #[error("business rule violated ({code}): {message}")]
    BusinessRule {
        /// Stable rule code, e.g. `mdm.rot.multiple`.
        code: String,
        /// Description of the violation.
        message: String,
    },

    /// A guard discriminator name that resolves to no known component key.
    #[error("unresolved guard discriminator '{name}'")]
    UnresolvedGuard {
        /// The symbolic name as written in the predicate.
        name: String,
    },

    /// The requested record, version, or query set does not exist.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// A value could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Underlying description.
        message: String,
    },
}

impl MedleyError {
    /// Create a constraint violation.
    pub fn constraint(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a query-mapping error for an unmapped path.
    pub fn query_mapping(path: impl Into<String>) -> Self {
        Self::QueryMapping { path: path.into() }
    }

    /// Create an optimistic-concurrency error.
    pub fn stale_version(expected: VersionId, found: VersionId) -> Self {
        Self::OptimisticConcurrency { expected, found }
    }

    /// Create a business-rule violation.
    pub fn business_rule(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BusinessRule {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an unresolved-guard error.
    pub fn unresolved_guard(name: impl Into<String>) -> Self {
        Self::UnresolvedGuard { name: name.into() }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Severity classification for this error.
    pub fn severity(&self) -> Severity {
        match self {
            MedleyError::NotFound { .. } => Severity::Informational,
            MedleyError::OptimisticConcurrency { .. } => Severity::Warning,
            MedleyError::Constraint { .. }
            | MedleyError::BusinessRule { .. }
            | MedleyError::UnresolvedGuard { .. } => Severity::Error,
            MedleyError::QueryMapping { .. } | MedleyError::Serialization { .. } => Severity::Fatal,
        }
    }

    /// Stable machine-readable code. Constraint and business-rule variants
    /// carry their own codes; the rest use fixed ones.
    pub fn code(&self) -> &str {
        match self {
            MedleyError::Constraint { code, .. } => code,
            MedleyError::BusinessRule { code, .. } => code,
            MedleyError::QueryMapping { .. } => "query.mapping",
            MedleyError::OptimisticConcurrency { .. } => "store.concurrency",
            MedleyError::UnresolvedGuard { .. } => "query.guard",
            MedleyError::NotFound { .. } => "store.notfound",
            MedleyError::Serialization { .. } => "core.serialization",
        }
    }

    /// Extract the structured detail for an outer layer.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code().to_string(),
            message: self.to_string(),
            severity: self.severity(),
        }
    }
}
