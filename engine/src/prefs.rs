//! Preferences store used to remember the last source and destination.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::EngineError;

/// Key for the last source directory.
pub const SOURCE_KEY: &str = "source_dir";
/// Key for the last destination directory.
pub const DESTINATION_KEY: &str = "destination_dir";

/// Simple string key/value persistence.
pub trait PreferencesStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been saved.
    fn load(&self, key: &str) -> Result<Option<String>, EngineError>;

    fn save(&self, key: &str, value: &str) -> Result<(), EngineError>;
}

/// Preferences kept as a flat JSON object in a single file.
pub struct JsonFilePreferences {
    path: PathBuf,
    // Serializes read-modify-write cycles from this process.
    lock: Mutex<()>,
}

impl JsonFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFilePreferences {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<config dir>/backup/preferences.json`, if the platform has a config dir.
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("backup").join("preferences.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self, key: &str) -> Result<BTreeMap<String, String>, EngineError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(persistence(key, format!("failed to read {}: {}", self.path.display(), e))),
        };
        serde_json::from_str(&content).map_err(|e| {
            persistence(key, format!("invalid JSON in {}: {}", self.path.display(), e))
        })
    }

    fn write_all(&self, key: &str, values: &BTreeMap<String, String>) -> Result<(), EngineError> {
        let content = serde_json::to_string_pretty(values)
            .map_err(|e| persistence(key, e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| persistence(key, e.to_string()))?;
            }
        }

        // Write to a temp file first, then rename over the old file.
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(|e| persistence(key, e.to_string()))?;
        fs::rename(&temp_path, &self.path).map_err(|e| persistence(key, e.to_string()))
    }
}

fn persistence(key: &str, reason: String) -> EngineError {
    EngineError::Persistence {
        key: key.to_string(),
        reason,
    }
}

impl PreferencesStore for JsonFilePreferences {
    fn load(&self, key: &str) -> Result<Option<String>, EngineError> {
        let _guard = self.lock.lock();
        Ok(self.read_all(key)?.remove(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let _guard = self.lock.lock();
        let mut values = self.read_all(key)?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(key, &values)
    }
}

/// In-memory preferences, for embedding without a file.
#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferencesStore for MemoryPreferences {
    fn load(&self, key: &str) -> Result<Option<String>, EngineError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), EngineError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
