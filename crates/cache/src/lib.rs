//! Stateful query continuation cache.
//!
//! Query result sets are registered under a query key so later pages can be
//! served without re-running the query. Entries hold deduplicated record
//! keys in insertion order and expire by age under a cooperative sweep.

mod cache;
mod options;

pub use cache::QuerySetCache;
pub use options::CacheOptions;
