//! External collaborator contracts: record linkage and review.

use medley_core::{RecordId, RecordView};
use medley_storage::RecordStore;
use parking_lot::Mutex;

/// Outcome of the external record-linkage algorithm for one local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// No candidate master: a new singleton master is created.
    NoMatch,
    /// A candidate exists but below the auto-link threshold: the local is
    /// left unlinked and handed to the review queue.
    Probable,
    /// Link the local to this master.
    Match(RecordId),
}

/// The record-linkage collaborator. Blocking/weighting is out of scope
/// here; implementations bring their own.
pub trait RecordMatcher: Send + Sync {
    /// Classify a freshly written local record.
    fn classify(&self, local: &RecordView, store: &RecordStore) -> MatchDecision;
}

/// Matcher that never finds a candidate. Every local becomes a singleton
/// master; useful for tests and for deployments that link manually.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverMatches;

impl RecordMatcher for NeverMatches {
    fn classify(&self, _local: &RecordView, _store: &RecordStore) -> MatchDecision {
        MatchDecision::NoMatch
    }
}

/// Receives locals with a Probable decision for human review.
pub trait ReviewQueue: Send + Sync {
    /// Hand off a local record pending resolution.
    fn enqueue(&self, local: RecordId);
}

/// In-memory review queue that just remembers what it was handed.
#[derive(Debug, Default)]
pub struct ReviewSink {
    pending: Mutex<Vec<RecordId>>,
}

impl ReviewSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything enqueued so far.
    pub fn drain(&self) -> Vec<RecordId> {
        std::mem::take(&mut self.pending.lock())
    }

    /// Number of pending locals.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl ReviewQueue for ReviewSink {
    fn enqueue(&self, local: RecordId) {
        self.pending.lock().push(local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_sink_accumulates_and_drains() {
        let sink = ReviewSink::new();
        let a = RecordId::new();
        let b = RecordId::new();
        sink.enqueue(a);
        sink.enqueue(b);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.drain(), vec![a, b]);
        assert!(sink.is_empty());
    }
}
