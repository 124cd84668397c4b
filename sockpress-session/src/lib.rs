//! Sockpress Session - session records shared between HTTP requests and sockets
//!
//! - **Store** ([`store`]): identifier → key/value record, in memory or on disk
//! - **Cookies** ([`cookie`]): express-session compatible signed identifiers
//! - **Bridge** ([`bridge`]): resolves the cookie of a request or WebSocket handshake
//!   and hands out [`SessionHandle`]s
//!
//! A handle whose record does not exist is not an error: reads come back empty
//! and writes are dropped.

pub mod bridge;
pub mod cookie;
pub mod error;
pub mod store;
pub mod types;

pub use bridge::{SessionBridge, SessionHandle};
pub use cookie::{CookieSigner, SessionCookie};
pub use error::{SessionError, SessionResult};
pub use store::{FileStore, MemoryStore, SessionStore};
pub use types::{SessionId, SessionRecord, StoreStats};

use sockpress_core::{SessionConfig, StoreKind};
use std::sync::Arc;
use std::time::Duration;

/// Build the bridge described by `config`
pub fn bridge_from_config(config: &SessionConfig) -> SessionResult<SessionBridge> {
    let max_age = Duration::from_secs(config.max_age_secs);
    let store: Arc<dyn SessionStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryStore::new(max_age)),
        StoreKind::File => {
            let dir = config
                .store_dir
                .as_deref()
                .ok_or_else(|| SessionError::store("file store requires store_dir"))?;
            Arc::new(FileStore::new(dir, max_age))
        }
    };

    Ok(SessionBridge::new(
        store,
        CookieSigner::new(&config.secret)?,
        SessionCookie {
            name: config.cookie_name.clone(),
            max_age_secs: config.max_age_secs,
            secure: config.secure_cookie,
        },
    ))
}
