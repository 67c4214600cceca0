//! Server-side storage of each user's collection.
//!
//! ```text
//! <DATA_DIR>/
//!   <user_id>/
//!     lists.json
//! ```
//!
//! Pushes are applied as a read-modify-write under a single lock, so two
//! devices pushing at once never lose each other's records.

use listsync_core::{reconcile, ListsPayload, Record};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

const LISTS_FILE: &str = "lists.json";

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum ServerStorageError {
    /// I/O error reading or writing a file.
    IoError(PathBuf, io::Error),
    /// Stored collection is not valid JSON.
    CorruptData(PathBuf, serde_json::Error),
    /// Invalid user ID (e.g., contains path separators).
    InvalidUserId(String),
}

impl std::fmt::Display for ServerStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            ServerStorageError::CorruptData(path, e) => {
                write!(f, "Failed to parse {}: {}", path.display(), e)
            }
            ServerStorageError::InvalidUserId(id) => write!(f, "Invalid user ID: {}", id),
        }
    }
}

impl std::error::Error for ServerStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerStorageError::IoError(_, e) => Some(e),
            ServerStorageError::CorruptData(_, e) => Some(e),
            ServerStorageError::InvalidUserId(_) => None,
        }
    }
}

/// Per-user JSON storage.
#[derive(Debug, Clone)]
pub struct ServerStorage {
    data_dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ServerStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Rejects ids that could escape the data directory.
    fn validate_user_id(user_id: &str) -> Result<(), ServerStorageError> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
            || user_id.starts_with('.')
        {
            return Err(ServerStorageError::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn lists_path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(user_id).join(LISTS_FILE)
    }

    /// Loads a user's collection, tombstones included. A user who never
    /// pushed has an empty collection.
    pub fn load(&self, user_id: &str) -> Result<Vec<Record>, ServerStorageError> {
        Self::validate_user_id(user_id)?;
        let path = self.lists_path(user_id);

        match fs::read_to_string(&path) {
            Ok(contents) => {
                let payload: ListsPayload = serde_json::from_str(&contents)
                    .map_err(|e| ServerStorageError::CorruptData(path, e))?;
                Ok(payload.lists)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ServerStorageError::IoError(path, e)),
        }
    }

    /// Merges `incoming` into the stored collection and returns the result.
    pub fn apply(
        &self,
        user_id: &str,
        incoming: &[Record],
    ) -> Result<Vec<Record>, ServerStorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = self.load(user_id)?;
        let merged = reconcile(&stored, incoming);
        self.save(user_id, &merged)?;

        tracing::debug!(
            user_id,
            incoming = incoming.len(),
            stored = merged.len(),
            "applied push"
        );
        Ok(merged)
    }

    fn save(&self, user_id: &str, records: &[Record]) -> Result<(), ServerStorageError> {
        let path = self.lists_path(user_id);
        let user_dir = self.data_dir.join(user_id);

        fs::create_dir_all(&user_dir)
            .map_err(|e| ServerStorageError::IoError(user_dir.clone(), e))?;

        let payload = ListsPayload::new(records.to_vec());
        let json = serde_json::to_vec_pretty(&payload)
            .map_err(|e| ServerStorageError::CorruptData(path.clone(), e))?;

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|e| ServerStorageError::IoError(temp_path.clone(), e))?;
        fs::rename(&temp_path, &path).map_err(|e| ServerStorageError::IoError(path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_storage() -> (ServerStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = ServerStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    #[test]
    fn test_load_unknown_user_is_empty() {
        let (storage, _temp) = test_storage();
        assert!(storage.load("alice").unwrap().is_empty());
    }

    #[test]
    fn test_apply_persists_and_merges() {
        let (storage, _temp) = test_storage();
        let first = Record::list("Dwarfs");
        let second = Record::list("Orcs");

        storage.apply("alice", &[first.clone()]).unwrap();
        let merged = storage.apply("alice", &[second.clone()]).unwrap();

        let ids: Vec<_> = merged.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);
        assert_eq!(storage.load("alice").unwrap(), merged);
    }

    #[test]
    fn test_apply_keeps_newer_stored_copy() {
        let (storage, _temp) = test_storage();
        let mut stored = Record::list("Dwarfs");
        let mut stale = stored.clone();
        stored.rename("Dwarfs 2000");
        stale.updated_at = stored.updated_at.map(|t| t - Duration::seconds(5));

        storage.apply("alice", &[stored.clone()]).unwrap();
        let merged = storage.apply("alice", &[stale]).unwrap();
        assert_eq!(merged, vec![stored]);
    }

    #[test]
    fn test_users_are_isolated() {
        let (storage, _temp) = test_storage();
        storage.apply("alice", &[Record::list("A")]).unwrap();
        assert!(storage.load("bob").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_user_ids() {
        let (storage, _temp) = test_storage();
        for id in ["", "../etc", "a/b", "a\\b", ".hidden"] {
            assert!(matches!(
                storage.load(id),
                Err(ServerStorageError::InvalidUserId(_))
            ));
        }
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (storage, temp) = test_storage();
        std::fs::create_dir_all(temp.path().join("alice")).unwrap();
        std::fs::write(temp.path().join("alice").join(LISTS_FILE), "not json").unwrap();

        assert!(matches!(
            storage.load("alice"),
            Err(ServerStorageError::CorruptData(_, _))
        ));
    }
}
