//! Identity-assigning authority registry.
//!
//! Business identifiers (MRNs, national IDs) are issued by authorities. An
//! authority scopes which record classes it may identify and may carry a
//! format pattern its values must match. Breaches surface as
//! `ConstraintViolation` with a stable code.

use medley_core::{AuthorityId, MedleyError, MedleyResult, RecordClass};
use regex::Regex;

/// A registered identity authority.
#[derive(Debug, Clone)]
pub struct IdentityAuthority {
    /// Authority key.
    pub id: AuthorityId,
    /// Unique domain name (e.g. `GOOD_HEALTH_MRN`).
    pub domain: String,
    /// Optional value format pattern.
    pub format: Option<String>,
    /// Record classes this authority may identify. Empty means unrestricted.
    pub scope: Vec<RecordClass>,
}

impl IdentityAuthority {
    /// Create an unrestricted authority with no format constraint.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            id: AuthorityId::new(),
            domain: domain.into(),
            format: None,
            scope: Vec::new(),
        }
    }

    /// Require identifier values to match the given pattern.
    pub fn with_format(mut self, pattern: impl Into<String>) -> Self {
        self.format = Some(pattern.into());
        self
    }

    /// Restrict the authority to the given record classes.
    pub fn scoped_to(mut self, classes: impl IntoIterator<Item = RecordClass>) -> Self {
        self.scope = classes.into_iter().collect();
        self
    }
}

/// An authority with its format pattern compiled.
#[derive(Debug)]
pub(crate) struct RegisteredAuthority {
    pub(crate) authority: IdentityAuthority,
    pub(crate) format: Option<Regex>,
}

impl RegisteredAuthority {
    /// Compile the format pattern; a bad pattern is a registration-time
    /// constraint violation, never a query-time surprise.
    pub(crate) fn compile(authority: IdentityAuthority) -> MedleyResult<Self> {
        let format = match &authority.format {
            Some(pattern) => Some(Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                MedleyError::constraint(
                    "authority.format",
                    format!("invalid format pattern for '{}': {e}", authority.domain),
                )
            })?),
            None => None,
        };
        Ok(Self { authority, format })
    }

    /// Check one identifier value against this authority for a record of
    /// the given class.
    pub(crate) fn check(&self, value: &str, class: RecordClass) -> MedleyResult<()> {
        if let Some(re) = &self.format {
            if !re.is_match(value) {
                return Err(MedleyError::constraint(
                    "identifier.format",
                    format!(
                        "value '{value}' does not match format of authority '{}'",
                        self.authority.domain
                    ),
                ));
            }
        }
        if !self.authority.scope.is_empty() && !self.authority.scope.contains(&class) {
            return Err(MedleyError::constraint(
                "identifier.scope",
                format!(
                    "authority '{}' does not identify {class} records",
                    self.authority.domain
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_mismatch_is_constraint_violation() {
        let auth = IdentityAuthority::new("MRN").with_format(r"\d{6}");
        let reg = RegisteredAuthority::compile(auth).unwrap();
        assert!(reg.check("123456", RecordClass::Patient).is_ok());
        let err = reg.check("12A456", RecordClass::Patient).unwrap_err();
        assert_eq!(err.code(), "identifier.format");
    }

    #[test]
    fn format_is_anchored() {
        let auth = IdentityAuthority::new("MRN").with_format(r"\d{3}");
        let reg = RegisteredAuthority::compile(auth).unwrap();
        assert!(reg.check("123456", RecordClass::Patient).is_err());
    }

    #[test]
    fn scope_breach_is_constraint_violation() {
        let auth = IdentityAuthority::new("NPI").scoped_to([RecordClass::Provider]);
        let reg = RegisteredAuthority::compile(auth).unwrap();
        assert!(reg.check("x", RecordClass::Provider).is_ok());
        let err = reg.check("x", RecordClass::Patient).unwrap_err();
        assert_eq!(err.code(), "identifier.scope");
    }

    #[test]
    fn empty_scope_is_unrestricted() {
        let reg = RegisteredAuthority::compile(IdentityAuthority::new("ANY")).unwrap();
        assert!(reg.check("anything", RecordClass::Place).is_ok());
    }

    #[test]
    fn bad_pattern_fails_registration() {
        let err = RegisteredAuthority::compile(
            IdentityAuthority::new("BAD").with_format(r"([unclosed"),
        )
        .unwrap_err();
        assert_eq!(err.code(), "authority.format");
    }
}
