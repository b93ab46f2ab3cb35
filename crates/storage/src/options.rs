//! Open-time settings for a [`RecordStore`](crate::RecordStore).

/// Whether a store accepts writes.
///
/// A read-only store serves reporting and replica-style read paths: every
/// mutating call (`insert`, `update`, `obsolete`, `set_tag`) fails with a
/// `store.readonly` constraint error before touching any table. There is no
/// way to flip the mode on a live store; reopen with different options
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Normal operation.
    #[default]
    ReadWrite,
    /// Reject every write.
    ReadOnly,
}

/// Settings fixed when the store is opened.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Write admission policy.
    pub access_mode: AccessMode,
}

impl StoreOptions {
    /// Read-write defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the write admission policy.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }
}
