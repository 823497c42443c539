//! Durable key/value persistence for subscription records and checkpoints.
//!
//! The engine treats the store as a dumb collaborator: `put`/`get`/`delete`
//! plus an ordered snapshot of all entries. Subscription records live under
//! [`SUBSCRIPTION_KEY_PREFIX`] and serialized [`SubscriptionCheckpoint`]
//! values under [`CHECKPOINT_KEY_PREFIX`], both keyed by subscription
//! identifier. The caller guarantees at most one writer per key.

use std::{collections::BTreeMap, sync::RwLock};

use serde::{Deserialize, Serialize};

use crate::StreamError;

/// Key prefix for persisted subscription records.
pub const SUBSCRIPTION_KEY_PREFIX: &str = "sb-";
/// Key prefix for persisted checkpoint values.
pub const CHECKPOINT_KEY_PREFIX: &str = "cp-";

/// Storage key for a subscription's persisted record.
#[must_use]
pub fn subscription_key(id: &str) -> String {
    format!("{SUBSCRIPTION_KEY_PREFIX}{id}")
}

/// Storage key for a subscription's checkpoint.
#[must_use]
pub fn checkpoint_key(id: &str) -> String {
    format!("{CHECKPOINT_KEY_PREFIX}{id}")
}

/// Serialized value stored under a subscription's checkpoint key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCheckpoint {
    /// Highest block number whose logs have been fully processed.
    pub hwm: u64,
}

/// Contract for the persistent key/value store backing checkpoints.
///
/// Implementations must be safe to call from multiple tasks; the engine
/// never issues concurrent writes for the same key.
pub trait CheckpointStore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StreamError>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StreamError>;

    fn delete(&self, key: &str) -> Result<(), StreamError>;

    /// Snapshot of all entries in ascending key order.
    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, StreamError>;

    fn close(&self) {}
}

/// In-memory [`CheckpointStore`] used by tests and embedded setups.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StreamError> {
        let mut inner =
            self.inner.write().map_err(|_| StreamError::Checkpoint("store lock poisoned".into()))?;
        inner.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StreamError> {
        let inner =
            self.inner.read().map_err(|_| StreamError::Checkpoint("store lock poisoned".into()))?;
        Ok(inner.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StreamError> {
        let mut inner =
            self.inner.write().map_err(|_| StreamError::Checkpoint("store lock poisoned".into()))?;
        inner.remove(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, StreamError> {
        let inner =
            self.inner.read().map_err(|_| StreamError::Checkpoint("store lock poisoned".into()))?;
        Ok(inner.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
    }
}
