//! In-process session store

use super::SessionStore;
use crate::{SessionError, SessionId, SessionRecord, SessionResult, StoreStats};
use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Records kept in a map behind an async lock
pub struct MemoryStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
    max_age: Duration,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(max_age: std::time::Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_age: Duration::from_std(max_age).unwrap_or_else(|_| Duration::days(36_500)),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run `f` on the live record for `id`, touching it first.
    /// Expired records are evicted on the way.
    async fn with_live<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> SessionResult<Option<R>> {
        self.ensure_open()?;
        let mut records = self.records.write().await;

        let expired = match records.get(id) {
            Some(record) => record.is_expired(self.max_age),
            None => return Ok(None),
        };
        if expired {
            records.remove(id);
            debug!(session_id = %id, "Evicted expired session");
            return Ok(None);
        }

        Ok(records.get_mut(id).map(|record| {
            record.touch();
            f(record)
        }))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(24 * 60 * 60))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn init(&self) -> SessionResult<()> {
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    async fn create(&self) -> SessionResult<SessionRecord> {
        self.ensure_open()?;
        let record = SessionRecord::new(SessionId::generate());
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        debug!(session_id = %record.id, "Created session");
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
        self.ensure_open()?;
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn cleanup_expired(&self) -> SessionResult<usize> {
        self.ensure_open()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(self.max_age));
        let removed = before - records.len();
        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        Ok(removed)
    }

    async fn stats(&self) -> SessionResult<StoreStats> {
        self.ensure_open()?;
        let records = self.records.read().await;
        Ok(StoreStats {
            total_sessions: records.len(),
            expired_sessions: records
                .values()
                .filter(|record| record.is_expired(self.max_age))
                .count(),
        })
    }

    async fn shutdown(&self) -> SessionResult<()> {
        self.closed.store(true, Ordering::Release);
        let mut records = self.records.write().await;
        info!("Memory session store shut down, dropping {} sessions", records.len());
        records.clear();
        Ok(())
    }
}
