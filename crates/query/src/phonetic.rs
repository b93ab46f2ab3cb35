//! Denormalized phonetic value index.
//!
//! Name-component search is a two-level join (record → name → component);
//! the phonetic hack answers `SoundsLike` filters from this
//! pre-materialized code table instead. The platform feeds the index on
//! every insert/update; codes are rebuilt per record, not diffed.

use dashmap::DashMap;
use medley_core::{ComponentKind, RecordId, RecordView};
use rustc_hash::FxHashSet;

/// Classic four-character soundex code. Returns `None` for input with no
/// ASCII letters.
pub fn soundex(word: &str) -> Option<String> {
    fn digit_of(c: char) -> Option<char> {
        match c {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    }

    let mut letters = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase());
    let first = letters.next()?;
    let mut code = String::with_capacity(4);
    code.push(first);
    let mut last = digit_of(first);
    for c in letters {
        match digit_of(c) {
            Some(d) => {
                if last != Some(d) {
                    code.push(d);
                    last = Some(d);
                    if code.len() == 4 {
                        break;
                    }
                }
            }
            // H and W are transparent: a repeated digit across them still
            // collapses. Vowels reset the run.
            None if c == 'H' || c == 'W' => {}
            None => last = None,
        }
    }
    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}

type Posting = (ComponentKind, String);

/// Phonetic codes per record, maintained alongside the store.
#[derive(Debug, Default)]
pub struct PhoneticIndex {
    by_code: DashMap<Posting, FxHashSet<RecordId>>,
    by_record: DashMap<RecordId, Vec<Posting>>,
}

impl PhoneticIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the postings for one record from its current view.
    pub fn index_record(&self, view: &RecordView) {
        let id = view.head.id;
        self.remove_record(id);

        let mut postings = Vec::new();
        for name in &view.names {
            for component in &name.components {
                if let Some(code) = soundex(&component.value) {
                    postings.push((component.kind, code));
                }
            }
        }
        for posting in &postings {
            self.by_code.entry(posting.clone()).or_default().insert(id);
        }
        self.by_record.insert(id, postings);
    }

    /// Drop all postings for one record.
    pub fn remove_record(&self, id: RecordId) {
        if let Some((_, old)) = self.by_record.remove(&id) {
            for posting in old {
                if let Some(mut set) = self.by_code.get_mut(&posting) {
                    set.remove(&id);
                }
            }
        }
    }

    /// Whether a record has a posting with the given code, restricted to
    /// the given kinds (empty = any).
    pub fn matches(&self, id: RecordId, kinds: &[ComponentKind], code: &str) -> bool {
        self.by_record.get(&id).map_or(false, |postings| {
            postings
                .iter()
                .any(|(k, c)| c == code && (kinds.is_empty() || kinds.contains(k)))
        })
    }

    /// All records holding the given code under one kind.
    pub fn lookup(&self, kind: ComponentKind, code: &str) -> FxHashSet<RecordId> {
        self.by_code
            .get(&(kind, code.to_string()))
            .map(|set| set.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soundex_reference_values() {
        assert_eq!(soundex("Robert").as_deref(), Some("R163"));
        assert_eq!(soundex("Rupert").as_deref(), Some("R163"));
        assert_eq!(soundex("Ashcraft").as_deref(), Some("A261"));
        assert_eq!(soundex("Tymczak").as_deref(), Some("T522"));
        assert_eq!(soundex("Pfister").as_deref(), Some("P236"));
        assert_eq!(soundex("Honeyman").as_deref(), Some("H555"));
    }

    #[test]
    fn soundex_matches_similar_surnames() {
        assert_eq!(soundex("Smith"), soundex("Smyth"));
        assert_ne!(soundex("Smith"), soundex("Jones"));
    }

    #[test]
    fn soundex_rejects_non_alphabetic() {
        assert!(soundex("1234").is_none());
        assert!(soundex("").is_none());
    }

    #[test]
    fn soundex_ignores_case_and_punctuation() {
        assert_eq!(soundex("o'brien"), soundex("OBrien"));
    }
}
