//! Collection engine configuration.

/// Configuration for one persistent collection instance.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Whether mutations on an uninitialized collection may be queued
    /// instead of forcing a load. Queueing is never used for map-shaped
    /// collections regardless of this flag.
    pub queue_operations: bool,

    /// Whether loads may be satisfied from the persister's cache region
    /// and flushes may write back to it.
    pub cache_enabled: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            queue_operations: true,
            cache_enabled: true,
        }
    }
}

impl CollectionConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether uninitialized mutations may be queued.
    #[must_use]
    pub const fn queue_operations(mut self, value: bool) -> Self {
        self.queue_operations = value;
        self
    }

    /// Sets whether the cache region participates in loads and flushes.
    #[must_use]
    pub const fn cache_enabled(mut self, value: bool) -> Self {
        self.cache_enabled = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CollectionConfig::default();
        assert!(config.queue_operations);
        assert!(config.cache_enabled);
    }

    #[test]
    fn builder_pattern() {
        let config = CollectionConfig::new()
            .queue_operations(false)
            .cache_enabled(false);

        assert!(!config.queue_operations);
        assert!(!config.cache_enabled);
    }
}
