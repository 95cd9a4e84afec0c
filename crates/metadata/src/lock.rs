//! Per-document mutual exclusion.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Identifies one metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey {
    pub storage_id: String,
    pub repository_id: String,
    pub group_id: String,
    pub artifact_id: String,
}

impl MetadataKey {
    pub fn new(storage_id: &str, repository_id: &str, group_id: &str, artifact_id: &str) -> Self {
        Self {
            storage_id: storage_id.to_string(),
            repository_id: repository_id.to_string(),
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
        }
    }
}

/// One async mutex per [`MetadataKey`], created on demand.
///
/// Holders of different keys never wait on each other. An entry is removed
/// when its last holder releases it with nobody else waiting.
#[derive(Debug, Default, Clone)]
pub struct LockTable {
    locks: Arc<DashMap<MetadataKey, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: MetadataKey) -> MetadataGuard {
        // Clone out of the map so the shard lock is not held while waiting.
        let mutex = Arc::clone(&self.locks.entry(key.clone()).or_default());
        let guard = mutex.lock_owned().await;
        MetadataGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(guard),
        }
    }

    /// Keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one metadata document until dropped.
#[derive(Debug)]
pub struct MetadataGuard {
    locks: Arc<DashMap<MetadataKey, Arc<Mutex<()>>>>,
    key: MetadataKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl MetadataGuard {
    pub fn key(&self) -> &MetadataKey {
        &self.key
    }
}

impl Drop for MetadataGuard {
    fn drop(&mut self) {
        // The guard owns a reference to the mutex; release it first so the
        // count below sees only the table and any waiters.
        drop(self.guard.take());
        self.locks.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
