//! Persistence of the runner state across restarts.
//!
//! The simulated store itself is not persisted. Instead, the number of live keys and the key
//! allocator are written to `runner-state.json` in the data directory on shutdown. On the next
//! start, a bounded number of placeholder records is seeded so that reads and deletes find keys
//! right away.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use storesim_core::{SharedStore, ValueRecord};

/// Name of the state file within the data directory.
pub const STATE_FILE_NAME: &str = "runner-state.json";

/// Upper bound on the number of records seeded on startup.
pub const MAX_SEEDED_RECORDS: u64 = 10_000;

/// Size of the zero-filled payload of seeded records.
pub const SEEDED_PAYLOAD_SIZE: usize = 256;

/// Counters that survive a restart of the runner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerState {
    /// Number of live keys at the time of the last shutdown.
    pub recovered_keys: u64,
    /// The next key the allocator would have handed out.
    pub next_key: u64,
}

impl RunnerState {
    /// Captures the current state of the given store.
    pub fn capture(store: &SharedStore) -> Self {
        Self {
            recovered_keys: store.size(),
            next_key: store.next_key(),
        }
    }
}

/// Returns the path of the state file in `data_dir`.
pub fn state_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STATE_FILE_NAME)
}

/// Loads the runner state from `data_dir`.
///
/// A missing or unreadable state file results in the default state, so a fresh data directory
/// starts from zero.
pub fn load(data_dir: &Path) -> RunnerState {
    let path = state_path(data_dir);

    let contents = match std::fs::read(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return RunnerState::default(),
        Err(err) => {
            tracing::warn!(
                error = &err as &dyn std::error::Error,
                path = %path.display(),
                "failed to read runner state, starting fresh"
            );
            return RunnerState::default();
        }
    };

    match serde_json::from_slice(&contents) {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(
                error = &err as &dyn std::error::Error,
                path = %path.display(),
                "failed to parse runner state, starting fresh"
            );
            RunnerState::default()
        }
    }
}

/// Writes the runner state to `data_dir`, creating the directory if needed.
pub fn save(data_dir: &Path, state: &RunnerState) -> io::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let json = serde_json::to_vec_pretty(state)?;
    std::fs::write(state_path(data_dir), json)
}

/// Seeds placeholder records for previously live keys.
///
/// At most [`MAX_SEEDED_RECORDS`] records are created for keys `0..n`, each with version `1` and a
/// zero-filled payload. Returns the number of seeded records.
pub fn seed(store: &SharedStore, recovered_keys: u64) -> u64 {
    let count = recovered_keys.min(MAX_SEEDED_RECORDS);
    let payload = Bytes::from(vec![0u8; SEEDED_PAYLOAD_SIZE]);

    for key in 0..count {
        store.seed(key, ValueRecord::new(1, payload.clone()));
    }

    count
}

/// Restores a store from the state saved in `data_dir`.
pub fn restore(data_dir: &Path) -> (Arc<SharedStore>, RunnerState) {
    let start = Instant::now();

    let state = load(data_dir);
    let store = SharedStore::new(state.next_key);
    let seeded = seed(&store, state.recovered_keys);

    tracing::info!(
        recovered_keys = state.recovered_keys,
        seeded,
        next_key = state.next_key,
        elapsed = ?start.elapsed(),
        "recovered runner state"
    );

    (Arc::new(store), state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(dir.path()), RunnerState::default());
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(state_path(dir.path()), b"{not json").unwrap();
        assert_eq!(load(dir.path()), RunnerState::default());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested").join("data");

        let state = RunnerState {
            recovered_keys: 42,
            next_key: 1_000,
        };
        save(&data_dir, &state).unwrap();

        let json = std::fs::read_to_string(state_path(&data_dir)).unwrap();
        assert!(json.contains("\"recoveredKeys\": 42"));
        assert!(json.contains("\"nextKey\": 1000"));

        assert_eq!(load(&data_dir), state);
    }

    #[test]
    fn seed_is_bounded() {
        let store = SharedStore::new(0);
        assert_eq!(seed(&store, 25_000), MAX_SEEDED_RECORDS);
        assert_eq!(store.size(), MAX_SEEDED_RECORDS);

        let record = store.get(9_999).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.payload.len(), SEEDED_PAYLOAD_SIZE);
        assert!(record.payload.iter().all(|&b| b == 0));
        assert!(store.get(MAX_SEEDED_RECORDS).is_none());
    }

    #[test]
    fn restore_keeps_allocator() {
        let dir = tempfile::tempdir().unwrap();
        let state = RunnerState {
            recovered_keys: 3,
            next_key: 500,
        };
        save(dir.path(), &state).unwrap();

        let (store, restored) = restore(dir.path());
        assert_eq!(restored, state);
        assert_eq!(store.size(), 3);
        assert_eq!(store.allocate_key(), 500);
    }

    #[test]
    fn capture_store() {
        let store = SharedStore::new(7);
        seed(&store, 2);
        store.allocate_key();

        let state = RunnerState::capture(&store);
        assert_eq!(state.recovered_keys, 2);
        assert_eq!(state.next_key, 8);
    }
}
