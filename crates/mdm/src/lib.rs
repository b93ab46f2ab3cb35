//! Master data merge engine.
//!
//! Links source-system ("local") records into master aggregates and
//! synthesizes read-time projections: the merged result is computed on
//! every read, never persisted. The record-linkage scoring algorithm lives
//! outside this crate; its [`MatchDecision`] is consumed as an input.

mod engine;
mod matcher;
mod merge;

pub use engine::MdmEngine;
pub use matcher::{MatchDecision, NeverMatches, RecordMatcher, ReviewQueue, ReviewSink};
