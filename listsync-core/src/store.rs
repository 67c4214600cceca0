//! Local persistence for the record collection and sync settings.
//!
//! The collection and the settings live under two fixed keys. [`FileStore`]
//! maps each key to a JSON file in a data directory; [`MemoryStore`] keeps
//! both in memory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::record::Record;

/// File holding the serialized record array.
pub const LISTS_FILE: &str = "lists.json";
/// File holding the [`Settings`] object.
pub const SETTINGS_FILE: &str = "settings.json";

/// Persisted user settings. Unknown keys are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

/// Errors that can occur while persisting local state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Storage backend for the local collection.
///
/// Loading never fails on malformed data: an unreadable collection is
/// treated as no local data.
pub trait Store: Send + Sync {
    fn load_records(&self) -> Vec<Record>;
    fn save_records(&self, records: &[Record]) -> Result<(), StoreError>;
    fn load_settings(&self) -> Settings;
    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}

/// Stores state as JSON files in a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn lists_path(&self) -> PathBuf {
        self.data_dir.join(LISTS_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    fn read_json<T>(&self, path: &Path) -> Option<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read local data");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparsable local data");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, path: PathBuf, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| StoreError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            path: path.clone(),
            source,
        })?;

        // Write to a sibling file first so a crash never leaves half a file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }
}

impl Store for FileStore {
    fn load_records(&self) -> Vec<Record> {
        self.read_json(&self.lists_path()).unwrap_or_default()
    }

    fn save_records(&self, records: &[Record]) -> Result<(), StoreError> {
        self.write_json(self.lists_path(), &records)
    }

    fn load_settings(&self) -> Settings {
        self.read_json(&self.settings_path()).unwrap_or_default()
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.write_json(self.settings_path(), settings)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Record>>,
    settings: Mutex<Settings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(records),
            settings: Mutex::default(),
        }
    }
}

impl Store for MemoryStore {
    fn load_records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn save_records(&self, records: &[Record]) -> Result<(), StoreError> {
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = records.to_vec();
        Ok(())
    }

    fn load_settings(&self) -> Settings {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("data"));
        (store, temp_dir)
    }

    #[test]
    fn test_missing_files_load_empty() {
        let (store, _temp) = test_store();
        assert!(store.load_records().is_empty());
        assert_eq!(store.load_settings(), Settings::default());
    }

    #[test]
    fn test_save_and_load_records() {
        let (store, _temp) = test_store();
        let records = vec![
            Record::list("Orcs").with_rank("a"),
            Record::folder("Events").with_rank("b"),
        ];

        store.save_records(&records).unwrap();
        assert!(store.lists_path().exists());
        assert_eq!(store.load_records(), records);
    }

    #[test]
    fn test_corrupt_lists_load_as_empty() {
        let (store, _temp) = test_store();
        fs::create_dir_all(store.data_dir()).unwrap();
        fs::write(store.lists_path(), b"{not json").unwrap();

        assert!(store.load_records().is_empty());
    }

    #[test]
    fn test_settings_roundtrip_keeps_unknown_keys() {
        let (store, _temp) = test_store();
        let mut settings = Settings::default();
        settings
            .values
            .insert("theme".to_string(), serde_json::json!("dark"));

        store.save_settings(&settings).unwrap();
        assert_eq!(store.load_settings(), settings);
        assert!(!store.data_dir().join("settings.json.tmp").exists());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::with_records(vec![Record::list("A")]);
        assert_eq!(store.load_records().len(), 1);

        store.save_records(&[]).unwrap();
        assert!(store.load_records().is_empty());
    }
}
