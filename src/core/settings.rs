//! Persisted user settings
//!
//! A flat key-value store holding user choices that outlive a session, currently
//! only the destination folder. Reads and writes are unsynchronised beyond the
//! store's own lock; they only happen from the processing loop or the CLI.

use crate::core::error::{CameraError, Result};
use log::debug;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Key under which the destination folder is stored
pub const DESTINATION_PATH_KEY: &str = "destinationPath";

/// Simple key-value settings backend
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Read the configured destination folder, if any
pub fn destination_path(store: &dyn SettingsStore) -> Option<PathBuf> {
    store
        .get(DESTINATION_PATH_KEY)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Remember `path` as the destination folder
pub fn set_destination_path(store: &dyn SettingsStore, path: &Path) -> Result<()> {
    store.set(DESTINATION_PATH_KEY, &path.to_string_lossy())
}

/// JSON file backed store, rewritten on every `set`
pub struct JsonSettings {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonSettings {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let values = if path.exists() {
            let file = File::open(&path)?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                CameraError::IoError(format!(
                    "Failed to parse settings file '{}': {}",
                    path.display(),
                    e
                ))
            })?
        } else {
            debug!("Settings file does not exist yet: {}", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&self.path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), values).map_err(|e| {
            CameraError::IoError(format!("Failed to write settings file: {}", e))
        })?;

        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| CameraError::IoError("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        self.write_file(&values)
    }
}

/// In-memory store for tests and one-shot runs
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination<P: AsRef<Path>>(path: P) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.write() {
            values.insert(
                DESTINATION_PATH_KEY.to_string(),
                path.as_ref().to_string_lossy().into_owned(),
            );
        }
        store
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|_| CameraError::IoError("settings lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonSettings::open(dir.path().join("settings.json")).unwrap();
        assert!(destination_path(&store).is_none());
    }

    #[test]
    fn test_destination_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("conf").join("settings.json");

        let store = JsonSettings::open(&file).unwrap();
        set_destination_path(&store, Path::new("/photos/import")).unwrap();
        drop(store);

        let reopened = JsonSettings::open(&file).unwrap();
        assert_eq!(
            destination_path(&reopened),
            Some(PathBuf::from("/photos/import"))
        );
        let raw = fs::read_to_string(&file).unwrap();
        assert!(raw.contains("\"destinationPath\""));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("settings.json");
        fs::write(&file, "{ not json").unwrap();
        assert!(JsonSettings::open(&file).is_err());
    }

    #[test]
    fn test_empty_destination_counts_as_unset() {
        let store = MemorySettings::new();
        store.set(DESTINATION_PATH_KEY, "").unwrap();
        assert!(destination_path(&store).is_none());
    }

    #[test]
    fn test_memory_with_destination() {
        let store = MemorySettings::with_destination("/tmp/out");
        assert_eq!(destination_path(&store), Some(PathBuf::from("/tmp/out")));
    }
}
