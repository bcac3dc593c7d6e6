//! Key/value persistence shared between surfaces.
//!
//! The engine persists small JSON blobs under well-known keys: the downed
//! target set, the pending cross-surface handoff payload, and the seed data
//! a detached popup reads on startup. Two backends: an in-memory map for
//! tests and the engine's default, and a JSON file for the CLI so state
//! survives between invocations.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::Result;

/// Well-known storage keys.
pub mod keys {
    /// JSON array of track ids marked as downed.
    pub const DOWN_TARGETS: &str = "downTargets";
    /// Pending handoff payload for the detached popup flow.
    pub const CRUISE_MISSILE_FLOW: &str = "cruiseMissileFlowData";
    /// Popup seed: target snapshot.
    pub const POPUP_TARGET_INFO: &str = "popupChatTargetInfo";
    /// Popup seed: initial transcript.
    pub const POPUP_INITIAL_MESSAGES: &str = "popupChatInitialMessages";
    /// Popup seed: remaining guided steps.
    pub const POPUP_STEPS: &str = "popupChatSteps";
}

/// String key/value store with last-write-wins semantics.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Read a JSON value under `key`. Malformed or absent data yields `None`;
/// malformed data is logged and treated as absent rather than failing the
/// caller.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, %err, "discarding malformed stored value");
            None
        }
    }
}

/// Write `value` as JSON under `key`.
pub fn set_json<T: Serialize>(store: &mut dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// Load the persisted downed-target id set.
pub fn load_downed(store: &dyn KeyValueStore) -> HashSet<String> {
    get_json::<Vec<String>>(store, keys::DOWN_TARGETS)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

/// Persist the downed-target id set. Ordering is stabilized so the stored
/// form is deterministic.
pub fn save_downed(store: &mut dyn KeyValueStore, downed: &HashSet<String>) -> Result<()> {
    let mut ids: Vec<&String> = downed.iter().collect();
    ids.sort();
    set_json(store, keys::DOWN_TARGETS, &ids)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// File-backed store holding all keys in a single JSON object. Every write
/// rewrites the file; the store is small and infrequently written.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open `path`, creating parent directories on first write. A missing
    /// file starts empty; a malformed file is an error.
    pub fn open(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}
