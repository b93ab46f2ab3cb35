//! Logical filters: what callers hand to `query`.

use crate::path::PropertyPath;
use medley_core::{Generation, MedleyResult, RecordClass};

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// String containment.
    Contains,
    /// String prefix.
    StartsWith,
    /// Phonetic similarity. No default mapping exists for this operator;
    /// translation relies on the phonetic hack.
    SoundsLike,
}

/// One property-path predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// The parsed path.
    pub path: PropertyPath,
    /// The operator.
    pub op: Comparator,
    /// The comparison value.
    pub value: serde_json::Value,
}

/// A conjunction of predicates over one record family.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Record family queried.
    pub class: RecordClass,
    /// Predicates, all of which must hold.
    pub predicates: Vec<Predicate>,
    /// Historical generation to evaluate at; `None` means each record's
    /// current generation.
    pub as_of: Option<Generation>,
    /// Whether obsoleted records participate.
    pub include_retired: bool,
}

impl Filter {
    /// Start an empty filter over one class.
    pub fn for_class(class: RecordClass) -> Self {
        Self {
            class,
            predicates: Vec::new(),
            as_of: None,
            include_retired: false,
        }
    }

    /// Add a predicate. The path is parsed eagerly so malformed paths fail
    /// at build time, not translation time.
    pub fn and(
        mut self,
        path: &str,
        op: Comparator,
        value: serde_json::Value,
    ) -> MedleyResult<Self> {
        self.predicates.push(Predicate {
            path: PropertyPath::parse(path)?,
            op,
            value,
        });
        Ok(self)
    }

    /// Evaluate at a historical generation instead of current.
    pub fn as_of_generation(mut self, generation: Generation) -> Self {
        self.as_of = Some(generation);
        self
    }

    /// Include obsoleted records.
    pub fn with_retired(mut self) -> Self {
        self.include_retired = true;
        self
    }
}
