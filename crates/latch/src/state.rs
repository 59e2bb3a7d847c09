//! Atomic file-backed key-value store for per-session state.
//!
//! State "rows" are individual JSON files in a shared directory. Saves go
//! through a temp file followed by a rename, so a reader never observes a
//! half-written file; the rename is the sole atomicity boundary. There is
//! no mutual exclusion across processes: two near-simultaneous
//! read-modify-write cycles both succeed and the later rename wins.
//!
//! Loads are tolerant of absence and corruption. A missing or undecodable
//! file reads as "no state", never as an error.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Key-value store backed by one JSON file per key.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `dir`. The directory is not created here;
    /// saves create it on demand.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.json.tmp"))
    }

    /// Load the value for `key`. Missing files and undecodable content both
    /// return `None`; corruption is logged and treated as empty state.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path(key);
        let json = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding corrupt state at {}: {e}", path.display());
                None
            }
        }
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create state dir: {e}"))?;

        let tmp_path = self.temp_path(key);
        let json =
            serde_json::to_string(value).map_err(|e| format!("Failed to serialize state: {e}"))?;
        std::fs::write(&tmp_path, json).map_err(|e| format!("Failed to write temp state: {e}"))?;
        std::fs::rename(&tmp_path, self.path(key))
            .map_err(|e| format!("Failed to rename state: {e}"))?;

        Ok(())
    }
}

/// Current unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
