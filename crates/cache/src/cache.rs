//! The continuation cache proper.

use crate::options::CacheOptions;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use medley_core::{MedleyError, MedleyResult, QueryId, RecordId};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One registered result set.
struct Entry {
    /// Record keys in insertion order, deduplicated.
    keys: Vec<RecordId>,
    /// Membership set backing the dedup.
    seen: FxHashSet<RecordId>,
    /// Caller-assigned tag, if any.
    tag: Option<String>,
    /// Total result count reported by the query, which may exceed the keys
    /// fetched so far.
    total: usize,
    /// Registration time; age is measured from here.
    created_at: DateTime<Utc>,
}

impl Entry {
    fn new(keys: Vec<RecordId>, total: usize) -> Self {
        let mut entry = Self {
            keys: Vec::with_capacity(keys.len()),
            seen: FxHashSet::default(),
            tag: None,
            total,
            created_at: Utc::now(),
        };
        entry.extend(keys);
        entry
    }

    fn extend(&mut self, keys: Vec<RecordId>) {
        for key in keys {
            if self.seen.insert(key) {
                self.keys.push(key);
            }
        }
    }
}

/// Concurrent continuation cache keyed by query identifier.
///
/// Entries are independent; per-entry state sits behind its own lock so
/// page reads on one query never contend with appends on another.
pub struct QuerySetCache {
    entries: DashMap<QueryId, Arc<Mutex<Entry>>>,
    tags: DashMap<String, QueryId>,
    options: CacheOptions,
}

impl QuerySetCache {
    /// A cache with default options.
    pub fn new() -> Self {
        Self::with_options(CacheOptions::new())
    }

    /// A cache with the given options.
    pub fn with_options(options: CacheOptions) -> Self {
        Self {
            entries: DashMap::new(),
            tags: DashMap::new(),
            options,
        }
    }

    /// Register (or re-register) a result set, optionally under a tag.
    ///
    /// Registration is an upsert: repeating it for the same query key
    /// replaces the stored keys and refreshes the entry's age. Duplicate
    /// keys collapse to their first occurrence. Passing no tag keeps any
    /// tag the entry already carries.
    pub fn register_query_set(
        &self,
        id: QueryId,
        keys: Vec<RecordId>,
        tag: Option<String>,
        total: usize,
    ) {
        let entry = Entry::new(keys, total);
        if let Some(existing) = self.entries.get(&id) {
            let mut locked = existing.lock();
            let kept = locked.tag.take();
            *locked = entry;
            locked.tag = kept;
        } else {
            self.entries.insert(id, Arc::new(Mutex::new(entry)));
        }
        if let Some(tag) = tag {
            // Registration cannot fail once the entry exists.
            let _ = self.set_query_tag(id, tag);
        }
    }

    /// Whether a result set is registered under this key.
    pub fn is_registered(&self, id: QueryId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Read one page of a registered result set.
    ///
    /// The slice is stable across calls: offsets index the deduplicated
    /// insertion order. An offset past the end yields an empty page.
    pub fn get_query_results(
        &self,
        id: QueryId,
        offset: usize,
        count: usize,
    ) -> MedleyResult<Vec<RecordId>> {
        let entry = self.entry(id)?;
        let locked = entry.lock();
        let start = offset.min(locked.keys.len());
        let end = offset.saturating_add(count).min(locked.keys.len());
        Ok(locked.keys[start..end].to_vec())
    }

    /// Append keys to a registered result set, ignoring ones already held.
    pub fn add_results(&self, id: QueryId, keys: Vec<RecordId>) -> MedleyResult<()> {
        let entry = self.entry(id)?;
        entry.lock().extend(keys);
        Ok(())
    }

    /// The total result count reported at registration.
    pub fn total_results(&self, id: QueryId) -> MedleyResult<usize> {
        Ok(self.entry(id)?.lock().total)
    }

    /// Number of keys fetched so far.
    pub fn fetched(&self, id: QueryId) -> MedleyResult<usize> {
        Ok(self.entry(id)?.lock().keys.len())
    }

    /// Tag a registered result set. Re-tagging moves the tag; the previous
    /// tag, if any, stops resolving.
    pub fn set_query_tag(&self, id: QueryId, tag: impl Into<String>) -> MedleyResult<()> {
        let tag = tag.into();
        let entry = self.entry(id)?;
        let mut locked = entry.lock();
        if let Some(old) = locked.tag.take() {
            self.tags.remove(&old);
        }
        locked.tag = Some(tag.clone());
        drop(locked);
        self.tags.insert(tag, id);
        Ok(())
    }

    /// Resolve a tag back to its query key.
    pub fn find_query_id(&self, tag: &str) -> Option<QueryId> {
        self.tags.get(tag).map(|entry| *entry)
    }

    /// Drop entries whose age has reached the configured maximum.
    ///
    /// The sweep runs in batches and checks `cancel` between them, so a
    /// shutdown signal interrupts it promptly; entries not yet examined
    /// survive to the next sweep. Returns how many entries were dropped.
    pub fn sweep(&self, cancel: &AtomicBool) -> usize {
        let cutoff = Utc::now() - self.options.max_age;
        let candidates: Vec<QueryId> = self.entries.iter().map(|e| *e.key()).collect();
        let mut dropped = 0;

        for batch in candidates.chunks(self.options.sweep_batch) {
            if cancel.load(Ordering::Relaxed) {
                debug!(dropped, "sweep cancelled");
                return dropped;
            }
            for id in batch {
                let expired_tag = match self.entries.get(id) {
                    Some(entry) => {
                        let locked = entry.lock();
                        if locked.created_at <= cutoff {
                            Some(locked.tag.clone())
                        } else {
                            None
                        }
                    }
                    None => continue,
                };
                if let Some(tag) = expired_tag {
                    self.entries.remove(id);
                    if let Some(tag) = tag {
                        self.tags.remove(&tag);
                    }
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, "sweep expired stale query sets");
        }
        dropped
    }

    /// Number of registered result sets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: QueryId) -> MedleyResult<Arc<Mutex<Entry>>> {
        self.entries
            .get(&id)
            .map(|e| e.clone())
            .ok_or_else(|| MedleyError::not_found(format!("query set {id}")))
    }
}

impl Default for QuerySetCache {
    fn default() -> Self {
        Self::new()
    }
}
