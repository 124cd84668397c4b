//! File-backed session store
//!
//! One pretty-printed JSON document per session, so records survive restarts.

use super::SessionStore;
use crate::{SessionError, SessionId, SessionRecord, SessionResult, StoreStats};
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct FileStore {
    /// Base directory for session files
    storage_dir: PathBuf,
    max_age: Duration,
    /// Serializes read-modify-write cycles on session files
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(storage_dir: P, max_age: std::time::Duration) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            max_age: Duration::from_std(max_age).unwrap_or_else(|_| Duration::days(36_500)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn session_file(&self, id: &SessionId) -> PathBuf {
        self.storage_dir.join(format!("{}.json", id))
    }

    /// An unreadable file counts as no session and is removed
    async fn read_record(&self, id: &SessionId) -> SessionResult<Option<SessionRecord>> {
        let json_data = match tokio::fs::read_to_string(self.session_file(id)).await {
            Ok(json_data) => json_data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Io(e)),
        };

        match serde_json::from_str::<SessionRecord>(&json_data) {
            Ok(record) if record.id == *id => Ok(Some(record)),
            Ok(_) | Err(_) => {
                warn!(session_id = %id, "Discarding unreadable session file");
                self.delete_file(id).await?;
                Ok(None)
            }
        }
    }

    /// Write to a temporary file, then rename over the record
    async fn write_record(&self, record: &SessionRecord) -> SessionResult<()> {
        let json_data = serde_json::to_string_pretty(record)?;
        let path = self.session_file(&record.id);
        let partial = path.with_extension("json.tmp");
        tokio::fs::write(&partial, json_data).await?;
        tokio::fs::rename(&partial, &path).await?;
        Ok(())
    }

    async fn delete_file(&self, id: &SessionId) -> SessionResult<bool> {
        match tokio::fs::remove_file(self.session_file(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::Io(e)),
        }
    }

    /// Same contract as the memory store: touch, apply, persist, evicting expired records.
    async fn with_live<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> SessionResult<Option<R>> {
        let _guard = self.write_lock.lock().await;

        let mut record = match self.read_record(id).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        if record.is_expired(self.max_age) {
            self.delete_file(id).await?;
            debug!(session_id = %id, "Evicted expired session file");
            return Ok(None);
        }

        record.touch();
        let result = f(&mut record);
        self.write_record(&record).await?;
        Ok(Some(result))
    }

    async fn session_ids(&self) -> SessionResult<Vec<SessionId>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.storage_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(SessionId::parse)
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn init(&self) -> SessionResult<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        info!(
            "Session storage initialized at: {}",
            self.storage_dir.display()
        );
        Ok(())
    }

    async fn create(&self) -> SessionResult<SessionRecord> {
        let _guard = self.write_lock.lock().await;
        let record = SessionRecord::new(SessionId::generate());
        self.write_record(&record).await?;
        debug!(session_id = %record.id, "Created session file");
        Ok(record)
    }

    async fn load(&self, id: &SessionId) -> SessionResult<Option<SessionRecord>> {
        self.with_live(id, |record| record.clone()).await
    }

    async fn get(&self, id: &SessionId, key: &str) -> SessionResult<Option<Value>> {
        Ok(self
            .with_live(id, |record| record.get(key).cloned())
            .await?
            .flatten())
    }

    async fn set(&self, id: &SessionId, key: &str, value: Value) -> SessionResult<bool> {
        Ok(self
            .with_live(id, |record| record.set(key, value))
            .await?
            .is_some())
    }

    async fn remove(&self, id: &SessionId, key: &str) -> SessionResult<Option<Value>> {
        Ok(self
            .with_live(id, |record| record.remove(key))
            .await?
            .flatten())
    }

    async fn destroy(&self, id: &SessionId) -> SessionResult<bool> {
        let _guard = self.write_lock.lock().await;
        self.delete_file(id).await
    }

    async fn cleanup_expired(&self) -> SessionResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut cleaned_count = 0;

        for id in self.session_ids().await? {
            match self.read_record(&id).await {
                Ok(Some(record)) if record.is_expired(self.max_age) => {
                    if self.delete_file(&id).await? {
                        cleaned_count += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to load session {} for cleanup: {}", id, e);
                }
            }
        }

        if cleaned_count > 0 {
            info!("Cleaned up {} expired session files", cleaned_count);
        }
        Ok(cleaned_count)
    }

    async fn stats(&self) -> SessionResult<StoreStats> {
        let mut stats = StoreStats::default();
        for id in self.session_ids().await? {
            if let Some(record) = self.read_record(&id).await? {
                stats.total_sessions += 1;
                if record.is_expired(self.max_age) {
                    stats.expired_sessions += 1;
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration as StdDuration;

    async fn store_in(dir: &tempfile::TempDir, max_age: StdDuration) -> FileStore {
        let store = FileStore::new(dir.path().join("sessions"), max_age);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_records_survive_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, StdDuration::from_secs(60)).await;
        let record = store.create().await.unwrap();
        assert!(store.set(&record.id, "counter", json!(7)).await.unwrap());
        drop(store);

        let reopened = store_in(&dir, StdDuration::from_secs(60)).await;
        assert_eq!(
            reopened.get(&record.id, "counter").await.unwrap(),
            Some(json!(7))
        );
        assert_eq!(reopened.stats().await.unwrap().total_sessions, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, StdDuration::from_secs(60)).await;
        let ghost = SessionId::generate();

        assert!(!store.set(&ghost, "variable", json!("foo")).await.unwrap());
        assert_eq!(store.get(&ghost, "variable").await.unwrap(), None);
        assert!(!store.session_file(&ghost).exists());
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, StdDuration::from_millis(20)).await;
        let record = store.create().await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(40)).await;

        assert_eq!(store.stats().await.unwrap().expired_sessions, 1);
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(!store.session_file(&record.id).exists());
    }

    #[tokio::test]
    async fn test_foreign_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, StdDuration::from_secs(60)).await;
        tokio::fs::write(store.storage_dir().join("notes.txt"), "hello")
            .await
            .unwrap();
        tokio::fs::write(store.storage_dir().join("bad.name.json"), "{}")
            .await
            .unwrap();

        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_truncated_file_reads_as_absent_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, StdDuration::from_secs(60)).await;
        let record = store.create().await.unwrap();
        tokio::fs::write(store.session_file(&record.id), r#"{"id":"#)
            .await
            .unwrap();

        assert!(store.load(&record.id).await.unwrap().is_none());
        assert!(!store.set(&record.id, "counter", json!(1)).await.unwrap());
        assert!(!store.session_file(&record.id).exists());

        // A fresh record is usable straight away
        let fresh = store.create().await.unwrap();
        assert!(store.set(&fresh.id, "counter", json!(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_writes_leave_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, StdDuration::from_secs(60)).await;
        let record = store.create().await.unwrap();
        store.set(&record.id, "k", json!("v")).await.unwrap();

        let mut entries = tokio::fs::read_dir(store.storage_dir()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![format!("{}.json", record.id)]);
    }
}
