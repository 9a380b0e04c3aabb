//! Injectable persistence port for cross-reload continuity.
//!
//! The core stays testable without a real host environment: anything that
//! wants snapshots implements [`SnapshotStore`], and the runtime only ever
//! talks to the trait.

use std::{
    fs, io,
    path::PathBuf,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chat_core::Message;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot storage unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot storage backend failure: {0}")]
    Backend(String),
    #[error("snapshot serialization failure: {0}")]
    Serialization(String),
}

/// Persisted view of the message store and the active conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StoreSnapshot {
    /// Conversation the snapshot belongs to, when one was active.
    pub active_conversation_id: Option<String>,
    /// Messages in display order.
    pub messages: Vec<Message>,
}

pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &StoreSnapshot) -> Result<(), SnapshotError>;

    fn load(&self) -> Result<Option<StoreSnapshot>, SnapshotError>;

    fn clear(&self) -> Result<(), SnapshotError>;
}

/// In-memory store used by tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    data: Arc<RwLock<Option<StoreSnapshot>>>,
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, snapshot: &StoreSnapshot) -> Result<(), SnapshotError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| SnapshotError::Backend("poisoned lock".to_owned()))?;
        *data = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<StoreSnapshot>, SnapshotError> {
        let data = self
            .data
            .read()
            .map_err(|_| SnapshotError::Backend("poisoned lock".to_owned()))?;
        Ok(data.clone())
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| SnapshotError::Backend("poisoned lock".to_owned()))?;
        *data = None;
        Ok(())
    }
}

/// JSON-file-backed store for cross-restart persistence.
///
/// Writes go through a sibling temp file plus rename so a crash mid-write
/// leaves the previous snapshot intact.
#[derive(Clone, Debug)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_owned();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn save(&self, snapshot: &StoreSnapshot) -> Result<(), SnapshotError> {
        let encoded = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| SnapshotError::Serialization(err.to_string()))?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, encoded).map_err(|err| SnapshotError::Backend(err.to_string()))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|err| SnapshotError::Backend(err.to_string()))
    }

    fn load(&self) -> Result<Option<StoreSnapshot>, SnapshotError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SnapshotError::Backend(err.to_string())),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| SnapshotError::Serialization(err.to_string()))
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SnapshotError::Backend(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::{MessageDirection, MessageId};

    fn snapshot() -> StoreSnapshot {
        StoreSnapshot {
            active_conversation_id: Some("c-1".to_owned()),
            messages: vec![Message {
                id: MessageId::Permanent("m-1".to_owned()),
                sender_id: "alice".to_owned(),
                content: "hi".to_owned(),
                timestamp_ms: 1_000,
                direction: MessageDirection::Sent,
            }],
        }
    }

    #[test]
    fn in_memory_roundtrip() {
        let store = InMemorySnapshotStore::default();
        assert_eq!(store.load().expect("load"), None);

        store.save(&snapshot()).expect("save should work");
        assert_eq!(store.load().expect("load"), Some(snapshot()));

        store.clear().expect("clear should work");
        assert_eq!(store.load().expect("load"), None);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileSnapshotStore::new(dir.path().join("snapshot.json"));

        assert_eq!(store.load().expect("load missing"), None);
        store.save(&snapshot()).expect("save should work");
        assert_eq!(store.load().expect("load"), Some(snapshot()));

        store.clear().expect("clear should work");
        assert_eq!(store.load().expect("load after clear"), None);
        store.clear().expect("clear is idempotent");
    }

    #[test]
    fn corrupt_file_reports_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "not json").expect("write");

        let store = JsonFileSnapshotStore::new(path);
        let err = store.load().expect_err("corrupt file must fail");
        assert!(matches!(err, SnapshotError::Serialization(_)));
    }

    #[derive(Default)]
    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn save(&self, _snapshot: &StoreSnapshot) -> Result<(), SnapshotError> {
            Err(SnapshotError::Unavailable("mock outage".to_owned()))
        }

        fn load(&self) -> Result<Option<StoreSnapshot>, SnapshotError> {
            Err(SnapshotError::Unavailable("mock outage".to_owned()))
        }

        fn clear(&self) -> Result<(), SnapshotError> {
            Err(SnapshotError::Unavailable("mock outage".to_owned()))
        }
    }

    #[test]
    fn mock_failure_surfaces_as_unavailable() {
        let store = FailingStore;
        let err = store.save(&snapshot()).expect_err("save must fail");
        assert_eq!(err, SnapshotError::Unavailable("mock outage".to_owned()));
    }
}
