//! Principals and policy decisions.
//!
//! The auth subsystem lives outside this workspace; it hands us an acting
//! [`Principal`] and a [`PolicyDecider`] implementation. Guarded entry
//! points call `decide` explicitly; there is no ambient security stack.

use crate::types::PolicyId;
use serde::{Deserialize, Serialize};

/// The acting identity for one logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name as issued by the auth subsystem.
    pub name: String,
}

impl Principal {
    /// Create a principal with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Outcome of a policy decision for one principal and one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyDecision {
    /// The principal may see data guarded by the policy.
    Grant,
    /// The principal may not.
    Deny,
    /// The principal may see it only under an elevated (break-glass) grant.
    Elevate,
}

/// Policy decision point. Implemented by the external auth subsystem.
pub trait PolicyDecider: Send + Sync {
    /// Decide whether `principal` may access data guarded by `policy`.
    fn decide(&self, principal: &Principal, policy: PolicyId) -> PolicyDecision;
}

/// Decider that grants everything. Useful for tests and trusted system
/// contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAll;

impl PolicyDecider for GrantAll {
    fn decide(&self, _principal: &Principal, _policy: PolicyId) -> PolicyDecision {
        PolicyDecision::Grant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_all_grants() {
        let decider = GrantAll;
        let p = Principal::new("anyone");
        assert_eq!(decider.decide(&p, PolicyId::new()), PolicyDecision::Grant);
    }

    #[test]
    fn principal_equality_is_by_name() {
        assert_eq!(Principal::new("a"), Principal::new("a"));
        assert_ne!(Principal::new("a"), Principal::new("b"));
    }
}
