//! Per-upload mutual exclusion
//!
//! Chunk writes and merges for the same (owner, logical name) are serialized
//! through one async mutex per key. Merges are additionally at most one in flight
//! per key: a second merge request fails fast instead of queueing behind the first.

use srce_core::{AppError, AppResult};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadKey {
    pub owner: String,
    pub logical_name: String,
}

impl UploadKey {
    pub fn new(owner: impl Into<String>, logical_name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            logical_name: logical_name.into(),
        }
    }
}

impl fmt::Display for UploadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.logical_name)
    }
}

#[derive(Default)]
struct LockTable {
    locks: HashMap<UploadKey, Arc<AsyncMutex<()>>>,
    merging: HashSet<UploadKey>,
}

/// Keyed lock table shared by every clone.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: Arc<Mutex<LockTable>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        // The table holds no invariant a panicking holder could break.
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &UploadKey) -> KeyGuard {
        let lock = {
            let mut table = self.table();
            table
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.clone().lock_owned().await;
        KeyGuard {
            locks: self.clone(),
            key: key.clone(),
            lock,
            guard: Some(guard),
        }
    }

    /// Claim the merge slot for `key`, then wait for exclusive access to it.
    ///
    /// Fails with `MergeInProgress` if another merge for the key has not finished.
    pub async fn begin_merge(&self, key: &UploadKey) -> AppResult<MergeGuard> {
        {
            let mut table = self.table();
            if !table.merging.insert(key.clone()) {
                return Err(AppError::MergeInProgress {
                    owner: key.owner.clone(),
                    logical_name: key.logical_name.clone(),
                });
            }
        }

        let slot = MergeSlot {
            locks: self.clone(),
            key: key.clone(),
        };
        let key_guard = self.lock(key).await;

        Ok(MergeGuard {
            _key_guard: key_guard,
            slot,
        })
    }

    pub fn is_merging(&self, key: &UploadKey) -> bool {
        self.table().merging.contains(key)
    }

    /// Number of keys with a live lock entry.
    pub fn tracked_keys(&self) -> usize {
        self.table().locks.len()
    }
}

/// Exclusive access to one key, released on drop.
pub struct KeyGuard {
    locks: KeyedLocks,
    key: UploadKey,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Only the table and this guard still reference the mutex: nobody is
        // waiting, so the entry can go.
        let mut table = self.locks.table();
        let idle = table
            .locks
            .get(&self.key)
            .map(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(&self.lock) == 2)
            .unwrap_or(false);
        if idle {
            table.locks.remove(&self.key);
        }
    }
}

struct MergeSlot {
    locks: KeyedLocks,
    key: UploadKey,
}

impl Drop for MergeSlot {
    fn drop(&mut self) {
        self.locks.table().merging.remove(&self.key);
    }
}

/// Held for the duration of one merge and whatever the caller does with its output.
pub struct MergeGuard {
    _key_guard: KeyGuard,
    slot: MergeSlot,
}

impl MergeGuard {
    pub fn key(&self) -> &UploadKey {
        &self.slot.key
    }
}
