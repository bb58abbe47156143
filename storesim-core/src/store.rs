//! In-memory key space shared by all workers.
//!
//! The [`SharedStore`] maps `u64` keys to immutable [`ValueRecord`]s. Updates replace the record
//! as a whole, so readers can hold on to a record without blocking writers. New keys come from a
//! monotonic allocator, which doubles as the upper bound for key selection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;

/// A stored value.
///
/// Records are never mutated once stored. A write to an existing key replaces the record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueRecord {
    /// Version counter of the record.
    pub version: u64,
    /// Creation or update time in milliseconds since the Unix epoch.
    pub timestamp_millis: u64,
    /// The payload bytes.
    pub payload: Bytes,
}

impl ValueRecord {
    /// Creates a record with the given version and payload, stamped with the current time.
    pub fn new(version: u64, payload: Bytes) -> Self {
        let timestamp_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);

        Self {
            version,
            timestamp_millis,
            payload,
        }
    }
}

/// Concurrent map from key to [`ValueRecord`] with a monotonic key allocator.
///
/// All operations are safe to call from any number of threads without external locking.
#[derive(Debug, Default)]
pub struct SharedStore {
    map: DashMap<u64, Arc<ValueRecord>>,
    next_key: AtomicU64,
}

impl SharedStore {
    /// Creates an empty store whose allocator starts at `next_key`.
    pub fn new(next_key: u64) -> Self {
        Self {
            map: DashMap::new(),
            next_key: AtomicU64::new(next_key),
        }
    }

    /// Returns the current record for `key`.
    pub fn get(&self, key: u64) -> Option<Arc<ValueRecord>> {
        self.map.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// Inserts or replaces the record for `key`.
    pub fn put(&self, key: u64, record: ValueRecord) {
        self.map.insert(key, Arc::new(record));
    }

    /// Removes `key` and returns the record it held.
    pub fn delete(&self, key: u64) -> Option<Arc<ValueRecord>> {
        self.map.remove(&key).map(|(_, record)| record)
    }

    /// Returns a fresh key, strictly greater than all keys returned before.
    pub fn allocate_key(&self) -> u64 {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }

    /// The number of live entries.
    pub fn size(&self) -> u64 {
        self.map.len() as u64
    }

    /// The current allocator value, an exclusive upper bound of all allocated keys.
    pub fn next_key(&self) -> u64 {
        self.next_key.load(Ordering::Relaxed)
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Inserts a record without going through the allocator.
    ///
    /// This is only meant for restoring recovered state before the workload starts.
    pub fn seed(&self, key: u64, record: ValueRecord) {
        self.map.insert(key, Arc::new(record));
    }
}
