use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of record: a list carrying application data, or a folder header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[default]
    List,
    Folder,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::List => write!(f, "list"),
            RecordKind::Folder => write!(f, "folder"),
        }
    }
}

/// A list or folder header as stored locally and exchanged with the server.
///
/// Field names on the wire follow the persisted format: `folder` holds the
/// group reference, `_deleted` the tombstone flag and `updated_at` the merge
/// timestamp. Fields this crate does not interpret (name, points, army data)
/// are kept in `payload` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(rename = "folder", default)]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "_deleted", default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Creates a new top-level list with a fresh id.
    pub fn list(name: impl Into<String>) -> Self {
        Self::new(RecordKind::List, name.into())
    }

    /// Creates a new, open folder header with a fresh id.
    pub fn folder(name: impl Into<String>) -> Self {
        let mut folder = Self::new(RecordKind::Folder, name.into());
        folder.open = true;
        folder
    }

    fn new(kind: RecordKind, name: String) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert("name".to_string(), serde_json::Value::String(name));
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            rank: None,
            group: None,
            open: false,
            updated_at: Some(Utc::now()),
            deleted: false,
            payload,
        }
    }

    pub fn with_rank(mut self, rank: impl Into<String>) -> Self {
        self.rank = Some(rank.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == RecordKind::Folder
    }

    /// True if this record is a member of the folder with the given id.
    pub fn is_member_of(&self, folder_id: &str) -> bool {
        !self.is_folder() && self.group.as_deref() == Some(folder_id)
    }

    /// Display name from the payload, if any.
    pub fn name(&self) -> Option<&str> {
        self.payload.get("name").and_then(|v| v.as_str())
    }

    /// Refreshes `updated_at`. Every user-visible mutation goes through here.
    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.payload
            .insert("name".to_string(), serde_json::Value::String(name.into()));
        self.touch();
    }

    pub fn set_open(&mut self, open: bool) {
        self.open = open;
        self.touch();
    }

    pub fn toggle_open(&mut self) {
        self.set_open(!self.open);
    }

    /// Soft-deletes the record. Rank and group are retained.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.touch();
    }

    /// Timestamp used for last-write-wins. Records that never carried one
    /// compare as the Unix epoch.
    pub fn timestamp_or_epoch(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Copy with `updated_at` filled in if it was missing.
    pub fn with_timestamp_backfilled(&self, now: DateTime<Utc>) -> Self {
        let mut record = self.clone();
        if record.updated_at.is_none() {
            record.updated_at = Some(now);
        }
        record
    }
}

/// The body of both sync endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListsPayload {
    #[serde(default)]
    pub lists: Vec<Record>,
}

impl ListsPayload {
    pub fn new(lists: Vec<Record>) -> Self {
        Self { lists }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_list_defaults() {
        let list = Record::list("Empire 2000");
        assert_eq!(list.kind, RecordKind::List);
        assert_eq!(list.name(), Some("Empire 2000"));
        assert!(list.rank.is_none());
        assert!(list.group.is_none());
        assert!(list.updated_at.is_some());
        assert!(!list.deleted);
        assert!(!list.id.is_empty());
    }

    #[test]
    fn test_new_folder_is_open() {
        let folder = Record::folder("Tournament");
        assert!(folder.is_folder());
        assert!(folder.open);
        assert!(folder.group.is_none());
    }

    #[test]
    fn test_deserialize_wire_format() {
        let value = json!({
            "id": "abc",
            "type": "list",
            "rank": "m",
            "folder": "f1",
            "updated_at": "2024-05-01T10:00:00Z",
            "_deleted": true,
            "name": "Dwarfs",
            "points": 2000,
            "army": "dwarfen-mountain-holds"
        });

        let record: Record = serde_json::from_value(value).unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.rank.as_deref(), Some("m"));
        assert_eq!(record.group.as_deref(), Some("f1"));
        assert!(record.deleted);
        assert_eq!(record.name(), Some("Dwarfs"));
        assert_eq!(record.payload.get("points"), Some(&json!(2000)));
        assert!(record.is_member_of("f1"));
    }

    #[test]
    fn test_payload_survives_roundtrip() {
        let value = json!({
            "id": "abc",
            "type": "folder",
            "folder": null,
            "open": true,
            "name": "Folder",
            "custom": {"nested": [1, 2, 3]}
        });

        let record: Record = serde_json::from_value(value).unwrap();
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["custom"], json!({"nested": [1, 2, 3]}));
        assert_eq!(back["type"], json!("folder"));
        assert_eq!(back["open"], json!(true));
        assert!(back.get("_deleted").is_none());
    }

    #[test]
    fn test_legacy_record_without_type_or_timestamp() {
        let record: Record = serde_json::from_value(json!({"id": "x", "name": "Old"})).unwrap();
        assert_eq!(record.kind, RecordKind::List);
        assert!(record.updated_at.is_none());
        assert_eq!(record.timestamp_or_epoch(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_mark_deleted_keeps_position() {
        let mut record = Record::list("A").with_rank("m").with_group("f1");
        record.updated_at = Some(DateTime::<Utc>::UNIX_EPOCH);
        record.mark_deleted();

        assert!(record.deleted);
        assert_eq!(record.rank.as_deref(), Some("m"));
        assert_eq!(record.group.as_deref(), Some("f1"));
        assert!(record.timestamp_or_epoch() > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_backfill_only_missing_timestamps() {
        let now = Utc::now();
        let mut missing = Record::list("A");
        missing.updated_at = None;
        assert_eq!(missing.with_timestamp_backfilled(now).updated_at, Some(now));

        let stamped = Record::list("B");
        let original = stamped.updated_at;
        assert_eq!(stamped.with_timestamp_backfilled(now).updated_at, original);
    }
}
