use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::lock;
use crate::state::Settings;

pub const STORE_FILE: &str = "settings.json";
pub const SETTINGS_KEY: &str = "readAnythingSettings";

/// Key-value persistence offered by the host.
pub trait SettingsBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }
}

/// A JSON object file holding one entry per key.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/ReadAnything/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        let config = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find the user configuration directory"))?;
        Ok(config.join("ReadAnything").join(STORE_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&data)
            .with_context(|| format!("Corrupt settings file {}", self.path.display()))?;
        match value {
            Value::Object(entries) => Ok(entries),
            other => anyhow::bail!("Settings file holds {} instead of an object", kind(&other)),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl SettingsBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.read_all().unwrap_or_else(|e| {
            tracing::warn!("Replacing unreadable settings file: {}", e);
            Map::new()
        });
        entries.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&Value::Object(entries))?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Loads and saves the [`Settings`] record. Neither operation fails: read
/// problems yield defaults and write problems are logged.
pub struct SettingsStore {
    backend: Box<dyn SettingsBackend>,
}

impl SettingsStore {
    pub fn new(backend: Box<dyn SettingsBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    /// File-backed store in the user's configuration directory, or an
    /// in-memory one when that directory is unknown.
    pub fn local() -> Self {
        match FileBackend::default_path() {
            Ok(path) => {
                tracing::info!("Using settings file {}", path.display());
                Self::new(Box::new(FileBackend::new(path)))
            }
            Err(e) => {
                tracing::warn!("{}. Settings will not outlive this session.", e);
                Self::in_memory()
            }
        }
    }

    pub fn load(&self) -> Settings {
        match self.backend.get(SETTINGS_KEY) {
            Ok(Some(value)) => Settings::from_stored(&value),
            Ok(None) => {
                tracing::info!("No stored settings found. Using defaults.");
                Settings::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read stored settings: {:#}. Using defaults.", e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) {
        let value = match serde_json::to_value(settings) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize settings: {}", e);
                return;
            }
        };
        if let Err(e) = self.backend.set(SETTINGS_KEY, value) {
            tracing::error!("Failed to save settings: {:#}", e);
        }
    }
}

#[cfg(feature = "desktop")]
pub use tauri_store::TauriStoreBackend;

#[cfg(feature = "desktop")]
mod tauri_store {
    use std::sync::Arc;

    use anyhow::Result;
    use serde_json::Value;
    use tauri::{AppHandle, Wry};
    use tauri_plugin_store::{Store, StoreExt};

    use super::{FileBackend, SettingsBackend, SettingsStore, STORE_FILE};

    pub struct TauriStoreBackend {
        store: Arc<Store<Wry>>,
    }

    impl SettingsBackend for TauriStoreBackend {
        fn get(&self, key: &str) -> Result<Option<Value>> {
            Ok(self.store.get(key))
        }

        fn set(&self, key: &str, value: Value) -> Result<()> {
            self.store.set(key, value);
            self.store.save()?;
            Ok(())
        }
    }

    impl SettingsStore {
        /// The plugin store, falling back to a local file and then to memory.
        pub fn for_app(app_handle: &AppHandle) -> Self {
            match app_handle.store(STORE_FILE) {
                Ok(store) => Self::new(Box::new(TauriStoreBackend { store })),
                Err(e) => {
                    tracing::warn!("Failed to open settings store: {}. Falling back to a local file.", e);
                    match FileBackend::default_path() {
                        Ok(path) => Self::new(Box::new(FileBackend::new(path))),
                        Err(_) => Self::in_memory(),
                    }
                }
            }
        }
    }
}
