//! Property-path parsing.
//!
//! Paths are dotted segment sequences; a segment may carry a bracketed
//! guard listing which rows of a to-many association participate:
//!
//! ```text
//! field.dob
//! name.component[given].value
//! relationship[member].target
//! ```
//!
//! A malformed path is a programming error and surfaces as a fatal
//! `QueryMapping` error, like an unmapped one.

use medley_core::{MedleyError, MedleyResult};
use std::fmt;

/// One parsed path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Segment name.
    pub name: String,
    /// Raw guard names, comma-separated inside the brackets.
    pub guard: Option<Vec<String>>,
}

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    /// Segments in order.
    pub segments: Vec<PathSegment>,
    raw: String,
}

impl PropertyPath {
    /// Parse a dotted path with optional bracket guards.
    pub fn parse(raw: &str) -> MedleyResult<Self> {
        if raw.is_empty() {
            return Err(MedleyError::query_mapping(raw));
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            segments.push(Self::parse_segment(part, raw)?);
        }
        Ok(Self {
            segments,
            raw: raw.to_string(),
        })
    }

    fn parse_segment(part: &str, raw: &str) -> MedleyResult<PathSegment> {
        if part.is_empty() {
            return Err(MedleyError::query_mapping(raw));
        }
        match part.find('[') {
            None => {
                if part.contains(']') {
                    return Err(MedleyError::query_mapping(raw));
                }
                Ok(PathSegment {
                    name: part.to_string(),
                    guard: None,
                })
            }
            Some(open) => {
                let close = match part.find(']') {
                    Some(c) if c == part.len() - 1 && c > open + 1 => c,
                    _ => return Err(MedleyError::query_mapping(raw)),
                };
                let name = &part[..open];
                if name.is_empty() {
                    return Err(MedleyError::query_mapping(raw));
                }
                let guard = part[open + 1..close]
                    .split(',')
                    .map(|g| g.trim().to_string())
                    .collect::<Vec<_>>();
                if guard.iter().any(String::is_empty) {
                    return Err(MedleyError::query_mapping(raw));
                }
                Ok(PathSegment {
                    name: name.to_string(),
                    guard: Some(guard),
                })
            }
        }
    }

    /// The path as originally written.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The first segment. Paths always have at least one.
    pub fn root(&self) -> &PathSegment {
        &self.segments[0]
    }

    /// Segments after the first.
    pub fn rest(&self) -> &[PathSegment] {
        &self.segments[1..]
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
