//! Session Bridge - one session record, reachable from HTTP handlers and sockets alike
//!
//! HTTP requests go through [`SessionBridge::load_or_create`]; WebSocket handshakes go
//! through [`SessionBridge::resolve`], which never creates anything. Both hand out
//! [`SessionHandle`]s over the same store.

use crate::cookie::{find_cookie, CookieSigner, SessionCookie};
use crate::store::SessionStore;
use crate::{SessionId, SessionResult};
use http::{HeaderMap, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SessionBridge {
    store: Arc<dyn SessionStore>,
    signer: CookieSigner,
    cookie: SessionCookie,
}

impl SessionBridge {
    pub fn new(store: Arc<dyn SessionStore>, signer: CookieSigner, cookie: SessionCookie) -> Self {
        Self {
            store,
            signer,
            cookie,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    /// Session identifier carried by the request, if present and correctly signed
    pub fn session_id(&self, headers: &HeaderMap) -> Option<SessionId> {
        let raw = find_cookie(headers, &self.cookie.name)?;
        let id = self.signer.unsign(&raw);
        if id.is_none() {
            debug!(cookie = %self.cookie.name, "Ignoring malformed or forged session cookie");
        }
        id
    }

    /// Bind a handle to the handshake's session cookie.
    ///
    /// The record may not exist; the handle then reads as empty and ignores writes.
    pub fn resolve(&self, headers: &HeaderMap) -> Option<SessionHandle> {
        self.session_id(headers)
            .map(|id| SessionHandle::new(id, Arc::clone(&self.store)))
    }

    /// HTTP side: reuse the live record named by the cookie or start a new one.
    ///
    /// The second element is the `Set-Cookie` value to send when a record was created.
    pub async fn load_or_create(
        &self,
        headers: &HeaderMap,
    ) -> SessionResult<(SessionHandle, Option<HeaderValue>)> {
        if let Some(id) = self.session_id(headers) {
            match self.store.load(&id).await {
                Ok(Some(_)) => return Ok((SessionHandle::new(id, Arc::clone(&self.store)), None)),
                Ok(None) => {}
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Session lookup failed, starting a new one");
                }
            }
        }

        let record = self.store.create().await?;
        let set_cookie = self
            .cookie
            .set_cookie_header(&self.signer.sign(&record.id));
        Ok((
            SessionHandle::new(record.id, Arc::clone(&self.store)),
            set_cookie,
        ))
    }
}

/// Get/set access to one session record
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn new(id: SessionId, store: Arc<dyn SessionStore>) -> Self {
        Self { id, store }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Value stored under `key`; `None` when the key or the whole record is missing
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(&self.id, key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(session_id = %self.id, key, error = %e, "Session read failed");
                None
            }
        }
    }

    /// Typed read; a value of the wrong shape reads as missing
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value).ok()
    }

    /// Store `value` under `key`. Silently discarded when the record does not exist;
    /// the return value tells whether anything was written.
    pub async fn set<T: Serialize>(&self, key: &str, value: T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(session_id = %self.id, key, error = %e, "Session value is not serializable");
                return false;
            }
        };
        match self.store.set(&self.id, key, value).await {
            Ok(written) => {
                if !written {
                    debug!(session_id = %self.id, key, "Discarded write to missing session");
                }
                written
            }
            Err(e) => {
                warn!(session_id = %self.id, key, error = %e, "Session write failed");
                false
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        match self.store.remove(&self.id, key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(session_id = %self.id, key, error = %e, "Session remove failed");
                None
            }
        }
    }

    /// Whether a live record backs this handle
    pub async fn exists(&self) -> bool {
        matches!(self.store.load(&self.id).await, Ok(Some(_)))
    }

    /// Delete the record; later reads through any handle come back empty
    pub async fn destroy(&self) -> bool {
        self.store.destroy(&self.id).await.unwrap_or_else(|e| {
            warn!(session_id = %self.id, error = %e, "Session destroy failed");
            false
        })
    }
}
