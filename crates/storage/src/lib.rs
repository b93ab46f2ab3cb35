//! Versioned persistence core.
//!
//! Durable CRUD over version-chained records and time-windowed associations.
//! The store keeps one root+version table pair per record family plus the
//! association tables, all behind a single write-serialized inner state;
//! transactional isolation is the inner lock's concern, version-chain and
//! window semantics are this crate's contract.
//!
//! Writes are append-only: `update` never mutates a prior version, it
//! appends a new one with a `replaces` back-pointer and closes changed
//! association rows at the new generation. Two updates racing from the same
//! base version produce exactly one winner; the loser gets
//! [`MedleyError::OptimisticConcurrency`](medley_core::MedleyError) and the
//! caller decides whether to retry.

mod assoc;
mod authority;
mod options;
mod store;

pub use authority::IdentityAuthority;
pub use options::{AccessMode, StoreOptions};
pub use store::{RecordStore, VersionSelector};
