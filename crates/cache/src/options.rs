//! Cache tuning knobs.

use chrono::Duration;

/// Configuration for [`crate::QuerySetCache`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Entries at least this old are dropped by the sweep.
    pub max_age: Duration,
    /// How many entries the sweep examines between cancellation checks.
    pub sweep_batch: usize,
}

impl CacheOptions {
    /// Defaults: 30 minute retention, batches of 64.
    pub fn new() -> Self {
        Self {
            max_age: Duration::minutes(30),
            sweep_batch: 64,
        }
    }

    /// Set the retention age.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the sweep batch size. Clamped to at least 1.
    pub fn sweep_batch(mut self, sweep_batch: usize) -> Self {
        self.sweep_batch = sweep_batch.max(1);
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let opts = CacheOptions::new()
            .max_age(Duration::seconds(5))
            .sweep_batch(0);
        assert_eq!(opts.max_age, Duration::seconds(5));
        assert_eq!(opts.sweep_batch, 1);
    }
}
