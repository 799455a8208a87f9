//! Session records on disk

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use parley_core::ChatMessage;

use crate::PersistenceError;

/// Persisted form of a conversation
///
/// `conversation_history` holds only user/assistant/tool messages; the
/// system prompt is re-supplied on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub model_id: String,
    pub turns: usize,
    pub conversation_history: Vec<ChatMessage>,
}

impl SessionRecord {
    /// Session id for a session created at `created_at`
    pub fn make_session_id(created_at: DateTime<Utc>) -> String {
        format!("session_{}", created_at.timestamp())
    }
}

/// Session record storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError>;

    /// The most recently written record, if any
    async fn load_latest(&self) -> Result<Option<SessionRecord>, PersistenceError>;
}

/// Flat-file JSON store: one `<session_id>.json` per session
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let bytes = serde_json::to_vec_pretty(record)?;
        let path = self.record_path(&record.session_id);

        // Atomic write: a crash mid-write must never truncate the previous
        // record.
        let tmp = self.dir.join(format!(".{}.json.tmp", record.session_id));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), turns = record.turns, "session saved");
        Ok(())
    }

    async fn load_latest(&self) -> Result<Option<SessionRecord>, PersistenceError> {
        let Some(path) = newest_record_file(&self.dir).await? else {
            return Ok(None);
        };

        let bytes = tokio::fs::read(&path).await?;
        let record: SessionRecord = serde_json::from_slice(&bytes)?;

        info!(path = %path.display(), turns = record.turns, "session restored");
        Ok(Some(record))
    }
}

/// Newest `session_*.json` in `dir` by modification time
async fn newest_record_file(dir: &Path) -> Result<Option<PathBuf>, PersistenceError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("session_") || !name.ends_with(".json") {
            continue;
        }

        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session_id: &str, turns: usize) -> SessionRecord {
        SessionRecord {
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            model_id: "test-model".to_string(),
            turns,
            conversation_history: vec![
                ChatMessage::user("你好"),
                ChatMessage::assistant("你好！有什么可以帮你？"),
            ],
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let original = record("session_1700000000", 1);
        store.save(&original).await.unwrap();

        let loaded = store.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded, original);

        // Round-trip identity: serializing the reloaded record yields the
        // same bytes.
        let first = serde_json::to_vec_pretty(&original).unwrap();
        let second = serde_json::to_vec_pretty(&loaded).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_latest_prefers_newest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        store.save(&record("session_1700000000", 1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store.save(&record("session_1700000099", 7)).await.unwrap();

        let loaded = store.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "session_1700000099");
        assert_eq!(loaded.turns, 7);
    }

    #[tokio::test]
    async fn test_load_from_missing_dir() {
        let store = FileSessionStore::new("definitely/not/a/real/dir");
        assert!(store.load_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_is_atomic_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let mut rec = record("session_1700000000", 1);
        store.save(&rec).await.unwrap();
        rec.turns = 2;
        rec.conversation_history.push(ChatMessage::user("还在吗"));
        store.save(&rec).await.unwrap();

        let loaded = store.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.turns, 2);
        assert_eq!(loaded.conversation_history.len(), 3);

        // No temp files left behind.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["session_1700000000.json"]);
    }
}
