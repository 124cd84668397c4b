//! Session Store - where session records live
//!
//! Every operation on an unknown or expired identifier reports absence
//! (`None` / `false`); errors are reserved for the backing medium failing.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::{SessionId, SessionRecord, SessionResult, StoreStats};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Prepare the store; called once on server start
    async fn init(&self) -> SessionResult<()> {
        Ok(())
    }

    /// Create and persist an empty record under a fresh identifier
    async fn create(&self) -> SessionResult<SessionRecord>;

    /// Fetch a live record, extending its last access
    async fn load(&self, id: &SessionId) -> SessionResult<Option<SessionRecord>>;

    /// Read one value, extending the record's last access
    async fn get(&self, id: &SessionId, key: &str) -> SessionResult<Option<Value>>;

    /// Write one value. Returns `false`, and stores nothing, when there is no live record
    async fn set(&self, id: &SessionId, key: &str, value: Value) -> SessionResult<bool>;

    /// Remove one value, returning it
    async fn remove(&self, id: &SessionId, key: &str) -> SessionResult<Option<Value>>;

    /// Delete the whole record
    async fn destroy(&self, id: &SessionId) -> SessionResult<bool>;

    /// Drop every expired record, returning how many were removed
    async fn cleanup_expired(&self) -> SessionResult<usize>;

    async fn stats(&self) -> SessionResult<StoreStats>;

    /// Release resources; called once on server shutdown
    async fn shutdown(&self) -> SessionResult<()> {
        Ok(())
    }
}
