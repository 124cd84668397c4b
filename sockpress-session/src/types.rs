//! Session Types and Structures

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque token correlating an HTTP client and its sockets with one record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Accept an identifier read from the outside world.
    ///
    /// Returns `None` for values that could not have been produced by [`SessionId::generate`]
    /// closely enough to be safe as a map key and a file name.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side key/value bag for one logical user session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl SessionRecord {
    /// Create an empty record
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            data: Map::new(),
            created_at: now,
            last_access: now,
        }
    }

    /// Update the last access timestamp
    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    /// Idle for longer than `max_age`
    pub fn is_expired(&self, max_age: Duration) -> bool {
        Utc::now() - self.last_access > max_age
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_sessions: usize,
    pub expired_sessions: usize,
}
