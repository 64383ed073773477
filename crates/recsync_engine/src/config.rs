//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use recsync_protocol::ConflictPolicy;
use recsync_storage::validate_key;

/// Default capacity of a worker's command channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Configuration for syncing one entity type.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Entity type name, also the prefix of every persisted state key.
    pub entity_type: String,
    /// Policy applied when local and remote copies conflict.
    pub conflict_policy: ConflictPolicy,
    /// Capacity of the worker command channel.
    pub channel_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration for an entity type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            conflict_policy: ConflictPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the worker channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Returns the persisted state keys for this entity type.
    pub fn state_keys(&self) -> StateKeys {
        StateKeys::for_entity(&self.entity_type)
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the entity type cannot be used
    /// as a state key prefix or the channel capacity is zero.
    pub fn validate(&self) -> SyncResult<()> {
        if self.channel_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "channel capacity must be at least 1".into(),
            ));
        }
        for key in self.state_keys().all() {
            validate_key(key).map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("records")
    }
}

/// The state store keys used by one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKeys {
    /// Identity map (JSON object).
    pub identity_map: String,
    /// Tombstone set (JSON array).
    pub tombstones: String,
    /// Last sync timestamp (JSON string).
    pub last_sync: String,
    /// Record archive.
    pub records: String,
}

impl StateKeys {
    /// Derives the keys for an entity type.
    pub fn for_entity(entity_type: &str) -> Self {
        Self {
            identity_map: format!("{entity_type}.identity_map"),
            tombstones: format!("{entity_type}.tombstones"),
            last_sync: format!("{entity_type}.last_sync"),
            records: format!("{entity_type}.records"),
        }
    }

    /// Returns every key.
    pub fn all(&self) -> [&str; 4] {
        [
            &self.identity_map,
            &self.tombstones,
            &self.last_sync,
            &self.records,
        ]
    }
}
