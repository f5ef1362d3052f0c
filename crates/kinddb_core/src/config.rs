//! Datastore configuration.

/// Largest encoded entity accepted by default (the managed service's limit).
pub const DEFAULT_MAX_ENTITY_BYTES: usize = 1_048_572;

/// Configuration for opening a datastore.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sync the journal after every write (safer but slower).
    pub sync_on_write: bool,

    /// Largest encoded entity accepted by `put`.
    pub max_entity_bytes: usize,

    /// Drop a torn record at the journal tail instead of failing to open.
    pub repair_torn_tail: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_entity_bytes: DEFAULT_MAX_ENTITY_BYTES,
            repair_torn_tail: true,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the entity size limit.
    #[must_use]
    pub const fn max_entity_bytes(mut self, limit: usize) -> Self {
        self.max_entity_bytes = limit;
        self
    }

    /// Sets whether a torn journal tail is repaired on open.
    #[must_use]
    pub const fn repair_torn_tail(mut self, value: bool) -> Self {
        self.repair_torn_tail = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.sync_on_write);
        assert!(config.repair_torn_tail);
        assert_eq!(config.max_entity_bytes, DEFAULT_MAX_ENTITY_BYTES);
    }

    #[test]
    fn builder() {
        let config = Config::new().sync_on_write(false).max_entity_bytes(64);
        assert!(!config.sync_on_write);
        assert_eq!(config.max_entity_bytes, 64);
    }
}
