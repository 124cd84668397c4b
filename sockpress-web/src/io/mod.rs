//! Real-time event layer
//!
//! Clients connect with a WebSocket to `{io_path}/?nsp=/namespace` and exchange JSON
//! packets (see [`packet`]). The session cookie sent with the handshake binds the
//! socket to the same record HTTP handlers see.

pub mod namespace;
pub mod packet;
pub mod router;
pub mod socket;

pub use namespace::{BroadcastOperator, Namespace};
pub use packet::Packet;
pub use router::IoRouter;
pub use socket::{Handshake, Socket};

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::Response,
};
use parking_lot::RwLock;
use serde::Serialize;
use sockpress_core::{not_found_error, validation_error, SockpressResult};
use sockpress_session::SessionBridge;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_NAMESPACE: &str = "/";

/// Namespace registry plus the session bridge handshakes are resolved against
#[derive(Clone)]
pub struct Io {
    inner: Arc<IoInner>,
}

struct IoInner {
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    bridge: Option<SessionBridge>,
    channel_capacity: usize,
}

impl std::fmt::Debug for Io {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Io")
            .field("namespaces", &self.namespace_paths())
            .field("sessions", &self.inner.bridge.is_some())
            .finish()
    }
}

impl Io {
    pub fn new(bridge: Option<SessionBridge>, channel_capacity: usize) -> Self {
        let root = Arc::new(Namespace::new(DEFAULT_NAMESPACE));
        let mut namespaces = HashMap::new();
        namespaces.insert(DEFAULT_NAMESPACE.to_string(), root);

        Self {
            inner: Arc::new(IoInner {
                namespaces: RwLock::new(namespaces),
                bridge,
                channel_capacity: channel_capacity.max(1),
            }),
        }
    }

    /// Registrar for the default namespace
    pub fn router(&self) -> IoRouter {
        IoRouter::new(self.root())
    }

    /// Registrar for namespace `path`, created on first use
    pub fn of(&self, path: &str) -> SockpressResult<IoRouter> {
        validate_namespace(path)?;
        if let Some(namespace) = self.namespace(path) {
            return Ok(IoRouter::new(namespace));
        }

        let namespace = Arc::clone(
            self.inner
                .namespaces
                .write()
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(Namespace::new(path))),
        );
        debug!(namespace = %path, "Created namespace");
        Ok(IoRouter::new(namespace))
    }

    pub fn namespace(&self, path: &str) -> Option<Arc<Namespace>> {
        self.inner.namespaces.read().get(path).cloned()
    }

    pub fn namespace_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.namespaces.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn root(&self) -> Arc<Namespace> {
        match self.namespace(DEFAULT_NAMESPACE) {
            Some(namespace) => namespace,
            None => {
                let namespace = Arc::new(Namespace::new(DEFAULT_NAMESPACE));
                self.inner
                    .namespaces
                    .write()
                    .insert(DEFAULT_NAMESPACE.to_string(), Arc::clone(&namespace));
                namespace
            }
        }
    }

    /// Send to every socket of the default namespace
    pub fn emit<T: Serialize>(&self, event: &str, data: T) -> usize {
        self.root().emit(event, data)
    }

    /// Room of the default namespace
    pub fn to(&self, room: &str) -> BroadcastOperator {
        self.root().to(room)
    }

    pub fn session_bridge(&self) -> Option<&SessionBridge> {
        self.inner.bridge.as_ref()
    }
}

fn validate_namespace(path: &str) -> SockpressResult<()> {
    if !path.starts_with('/') {
        return Err(validation_error!(
            format!("namespace '{}' must start with '/'", path),
            "namespace",
            "io"
        ));
    }
    if path.chars().any(char::is_whitespace) {
        return Err(validation_error!(
            format!("namespace '{}' contains whitespace", path),
            "namespace",
            "io"
        ));
    }
    Ok(())
}

/// `GET {io_path}/`: upgrade and attach the socket to the requested namespace
pub async fn io_endpoint(
    ws: WebSocketUpgrade,
    State(io): State<Io>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let nsp = query
        .get("nsp")
        .cloned()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    let session = io.session_bridge().and_then(|bridge| bridge.resolve(&headers));
    let handshake = Handshake::new(headers, query);
    let capacity = io.inner.channel_capacity;

    ws.on_upgrade(move |websocket| async move {
        match io.namespace(&nsp) {
            Some(namespace) => {
                socket::drive(websocket, namespace, handshake, session, capacity).await;
            }
            None => {
                not_found_error!(format!("namespace {}", nsp), "io").log();
                socket::reject(websocket, &nsp).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_namespace_exists() {
        let io = Io::new(None, 16);
        assert!(io.namespace("/").is_some());
        assert_eq!(io.router().namespace().path(), "/");
    }

    #[test]
    fn test_of_reuses_namespace() {
        let io = Io::new(None, 16);
        let first = io.of("/namespace").unwrap();
        first.route("ping namespace", |_, _| async {}).unwrap();

        let again = io.of("/namespace").unwrap();
        assert!(Arc::ptr_eq(first.namespace(), again.namespace()));
        assert_eq!(again.namespace().events(), vec!["ping namespace"]);
        assert_eq!(io.namespace_paths(), vec!["/", "/namespace"]);
    }

    #[test]
    fn test_of_rejects_bad_paths() {
        let io = Io::new(None, 16);
        assert!(io.of("namespace").is_err());
        assert!(io.of("/name space").is_err());
        assert!(io.namespace("/missing").is_none());
    }

    #[test]
    fn test_namespaces_keep_separate_tables() {
        let io = Io::new(None, 16);
        io.router().route("PING", |_, _| async {}).unwrap();
        assert!(io.of("/other").unwrap().route("PING", |_, _| async {}).is_ok());
    }
}
