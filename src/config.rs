use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SuperioError};

/// Quirk key naming the chipset family for a HWID GUID.
pub const QUIRK_KEY_GTYPE: &str = "SuperioGType";
pub const QUIRK_KEY_ID: &str = "SuperioId";
pub const QUIRK_KEY_PORT: &str = "SuperioPort";
pub const QUIRK_KEY_CONTROL_PORT: &str = "SuperioControlPort";
pub const QUIRK_KEY_DATA_PORT: &str = "SuperioDataPort";
pub const QUIRK_KEY_TIMEOUT: &str = "SuperioTimeout";
pub const QUIRK_KEY_AUTOLOAD_ACTION: &str = "SuperioAutoloadAction";

/// Every quirk key the plugin consumes.
pub const QUIRK_KEYS: &[&str] = &[
    QUIRK_KEY_GTYPE,
    QUIRK_KEY_ID,
    QUIRK_KEY_PORT,
    QUIRK_KEY_CONTROL_PORT,
    QUIRK_KEY_DATA_PORT,
    QUIRK_KEY_TIMEOUT,
    QUIRK_KEY_AUTOLOAD_ACTION,
];

/// On-disk layout of a quirk document: `{ "<id>": { "<key>": "<value>" } }`.
type QuirkDocument = BTreeMap<String, BTreeMap<String, String>>;

/// Declarative per-id configuration overrides.
///
/// Ids are either HWID GUIDs or device instance ids. Only keys registered with
/// [`QuirkStore::add_key`] are answered; anything else in the documents is
/// carried but ignored.
#[derive(Default)]
pub struct QuirkStore {
    entries: RwLock<HashMap<String, BTreeMap<String, String>>>,
    keys: RwLock<HashSet<String>>,
}

impl QuirkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a single JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let store = Self::new();
        store.merge_json(json)?;
        Ok(store)
    }

    /// Load every `*.json` file in `dir`, in file name order.
    ///
    /// A missing directory yields an empty store.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let store = Self::new();
        if !dir.exists() {
            log::debug!("quirk directory {} does not exist", dir.display());
            return Ok(store);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| SuperioError::Config(format!("Failed to read quirk directory: {e}")))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for file in &files {
            store.load_file(file)?;
        }
        Ok(store)
    }

    /// Merge one JSON quirk file into the store.
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let data = fs::read_to_string(path).map_err(|e| {
            SuperioError::Config(format!("Failed to read quirk file {}: {e}", path.display()))
        })?;
        self.merge_json(&data).map_err(|e| {
            SuperioError::Config(format!("Failed to parse quirk file {}: {e}", path.display()))
        })
    }

    /// Merge a JSON document; later values win for the same id and key.
    pub fn merge_json(&self, json: &str) -> Result<()> {
        let doc: QuirkDocument = serde_json::from_str(json)
            .map_err(|e| SuperioError::Config(format!("Failed to parse quirks: {e}")))?;

        let mut entries = self.entries.write();
        for (id, values) in doc {
            entries.entry(id).or_default().extend(values);
        }
        Ok(())
    }

    /// Set a single value.
    pub fn insert(&self, id: &str, key: &str, value: &str) {
        let _ = self
            .entries
            .write()
            .entry(id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Declare a key as consumed so lookups for it are answered.
    pub fn add_key(&self, key: &str) {
        let _ = self.keys.write().insert(key.to_string());
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.keys.read().contains(key)
    }

    /// Look up the value of `key` for `id`.
    pub fn lookup(&self, id: &str, key: &str) -> Option<String> {
        if !self.has_key(key) {
            log::debug!("quirk key {key} was never registered, ignoring lookup for {id}");
            return None;
        }
        self.entries.read().get(id)?.get(key).cloned()
    }

    /// Look up a numeric value, accepting decimal or `0x`-prefixed hex.
    pub fn lookup_u64(&self, id: &str, key: &str, max: u64) -> Result<Option<u64>> {
        let Some(value) = self.lookup(id, key) else {
            return Ok(None);
        };
        let parsed = parse_u64(&value).ok_or_else(|| SuperioError::InvalidQuirk {
            id: id.to_string(),
            key: key.to_string(),
            reason: format!("{value} is not a number"),
        })?;
        if parsed > max {
            return Err(SuperioError::InvalidQuirk {
                id: id.to_string(),
                key: key.to_string(),
                reason: format!("{value} is larger than 0x{max:X}"),
            });
        }
        Ok(Some(parsed))
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Paths the plugin touches on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuperioOptions {
    /// Character device giving direct port access
    pub port_device: PathBuf,

    /// securityfs file reporting the kernel lockdown mode
    pub lockdown_file: PathBuf,
}

impl Default for SuperioOptions {
    fn default() -> Self {
        Self {
            port_device: PathBuf::from("/dev/port"),
            lockdown_file: PathBuf::from("/sys/kernel/security/lockdown"),
        }
    }
}
