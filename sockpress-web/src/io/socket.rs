//! Connection contexts and the per-connection driver
//!
//! Each accepted WebSocket gets a [`Socket`]. A writer task drains a bounded queue into
//! the sink while the reader loop dispatches inbound packets one at a time.

use super::namespace::{BroadcastOperator, Namespace};
use super::packet::{Packet, CONNECT_ERROR};
use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use sockpress_core::{ErrorContext, SockpressError};
use sockpress_session::SessionHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Frames queued for the writer task
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Utf8Bytes),
    Pong(Bytes),
    Close,
}

/// Sending half of one connection, shared with the namespace for fan-out
#[derive(Debug)]
pub(crate) struct Outlet {
    id: String,
    tx: mpsc::Sender<Outbound>,
    dropped: AtomicU64,
}

impl Outlet {
    pub(crate) fn new(id: String, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Queue without waiting; a full queue drops the message for this client only
    pub(crate) fn send(&self, message: Outbound) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total_drops = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(socket_id = %self.id, total_drops, "Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Serialize one packet into a frame; `None` (logged) if the payload cannot be encoded
pub(crate) fn encode_frame<T: Serialize>(event: &str, data: T) -> Option<Utf8Bytes> {
    let data = match serde_json::to_value(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event, error = %e, "Event payload is not serializable");
            return None;
        }
    };
    match Packet::new(event, data).encode() {
        Ok(text) => Some(Utf8Bytes::from(text)),
        Err(e) => {
            warn!(event, error = %e, "Failed to encode packet");
            None
        }
    }
}

/// What the client sent when it connected
#[derive(Debug, Clone)]
pub struct Handshake {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub issued_at: DateTime<Utc>,
}

impl Handshake {
    pub fn new(headers: HeaderMap, query: HashMap<String, String>) -> Self {
        Self {
            headers,
            query,
            issued_at: Utc::now(),
        }
    }
}

/// One client connection inside a namespace. Cheap to clone.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

struct SocketInner {
    id: String,
    namespace: Arc<Namespace>,
    outlet: Arc<Outlet>,
    handshake: Handshake,
    session: Option<SessionHandle>,
    connected: AtomicBool,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.inner.id)
            .field("namespace", &self.inner.namespace.path())
            .finish_non_exhaustive()
    }
}

impl Socket {
    pub(crate) fn new(
        namespace: Arc<Namespace>,
        outlet: Arc<Outlet>,
        handshake: Handshake,
        session: Option<SessionHandle>,
    ) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                id: outlet.id().to_string(),
                namespace,
                outlet,
                handshake,
                session,
                connected: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Path of the namespace this socket belongs to
    pub fn namespace(&self) -> &str {
        self.inner.namespace.path()
    }

    pub fn handshake(&self) -> &Handshake {
        &self.inner.handshake
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire) && !self.inner.outlet.is_closed()
    }

    /// Send an event to this client only
    pub fn emit<T: Serialize>(&self, event: &str, data: T) -> bool {
        match encode_frame(event, data) {
            Some(frame) => self.inner.outlet.send(Outbound::Frame(frame)),
            None => false,
        }
    }

    /// Everyone in the namespace except this socket
    pub fn broadcast(&self) -> BroadcastOperator {
        BroadcastOperator::new(Arc::clone(&self.inner.namespace)).except(self.id())
    }

    /// Members of `room` except this socket
    pub fn to(&self, room: &str) -> BroadcastOperator {
        self.broadcast().to(room)
    }

    /// Members of `room`, this socket included if it joined
    pub fn within(&self, room: &str) -> BroadcastOperator {
        BroadcastOperator::new(Arc::clone(&self.inner.namespace)).to(room)
    }

    pub fn join(&self, room: &str) {
        self.inner.namespace.join(self.id(), room);
    }

    pub fn leave(&self, room: &str) {
        self.inner.namespace.leave(self.id(), room);
    }

    pub fn rooms(&self) -> Vec<String> {
        self.inner.namespace.rooms_of(self.id())
    }

    /// Close the connection after everything already queued has been written
    pub async fn disconnect(&self) {
        if self.inner.connected.swap(false, Ordering::AcqRel) {
            debug!(socket_id = %self.id(), "Server-initiated disconnect");
            // Waits for queue space so the close is never dropped
            let _ = self.inner.outlet.tx.send(Outbound::Close).await;
        }
    }

    /// Session bound at handshake time, if the client presented a valid cookie
    pub fn session(&self) -> Option<&SessionHandle> {
        self.inner.session.as_ref()
    }

    pub async fn session_get(&self, key: &str) -> Option<Value> {
        self.session()?.get(key).await
    }

    /// No-op (returns false) when the socket has no session or the record is gone
    pub async fn session_set<T: Serialize>(&self, key: &str, value: T) -> bool {
        match self.session() {
            Some(session) => session.set(key, value).await,
            None => {
                debug!(socket_id = %self.id(), key, "Session write without session, ignored");
                false
            }
        }
    }
}

/// Tell a client its namespace does not exist, then close
pub(crate) async fn reject(mut ws: WebSocket, nsp: &str) {
    let payload = serde_json::json!({ "message": "Invalid namespace", "nsp": nsp });
    if let Some(frame) = encode_frame(CONNECT_ERROR, payload) {
        let _ = ws.send(Message::Text(frame)).await;
    }
    let _ = ws.send(Message::Close(None)).await;
}

/// Drive one accepted connection until either side closes it
pub(crate) async fn drive(
    ws: WebSocket,
    namespace: Arc<Namespace>,
    handshake: Handshake,
    session: Option<SessionHandle>,
    channel_capacity: usize,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(channel_capacity);
    let outlet = Arc::new(Outlet::new(uuid::Uuid::new_v4().to_string(), tx));
    let socket = Socket::new(Arc::clone(&namespace), Arc::clone(&outlet), handshake, session);
    let socket_id = socket.id().to_string();

    namespace.insert(Arc::clone(&outlet));
    info!(
        socket_id = %socket_id,
        namespace = %namespace.path(),
        has_session = socket.session().is_some(),
        "Socket connected"
    );

    let mut writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let result = match outbound {
                Outbound::Frame(frame) => sink.send(Message::Text(frame)).await,
                Outbound::Pong(payload) => sink.send(Message::Pong(payload)).await,
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    for handler in namespace.connect_handlers() {
        handler(socket.clone()).await;
    }

    let reason = loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match Packet::decode(text.as_str()) {
                    Ok(packet) => dispatch(&namespace, &socket, packet).await,
                    Err(e) => warn!(socket_id = %socket_id, error = %e, "Ignoring malformed frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    outlet.send(Outbound::Pong(payload));
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(socket_id = %socket_id, "Ignoring binary frame");
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break "client disconnect",
                Some(Err(e)) => {
                    SockpressError::Transport {
                        message: "WebSocket read failed".to_string(),
                        source: Some(Box::new(e)),
                        context: ErrorContext::new("socket")
                            .with_operation("read")
                            .with_metadata("socket_id", &socket_id),
                    }
                    .log();
                    break "transport error";
                }
            },
            _ = &mut writer => break "server disconnect",
        }
    };

    socket.inner.connected.store(false, Ordering::Release);
    namespace.remove(&socket_id);
    writer.abort();

    for handler in namespace.disconnect_handlers() {
        handler(socket.clone(), reason.to_string()).await;
    }
    info!(socket_id = %socket_id, namespace = %namespace.path(), reason, "Socket disconnected");
}

/// Run the handler registered for the packet's event. Unknown events are ignored.
async fn dispatch(namespace: &Namespace, socket: &Socket, packet: Packet) {
    let Some(handler) = namespace.handler(&packet.event) else {
        debug!(socket_id = %socket.id(), event = %packet.event, "No handler for event");
        return;
    };

    // A panicking handler must not take the connection loop down with it
    let event = packet.event;
    if let Err(e) = tokio::spawn(handler(socket.clone(), packet.data)).await {
        SockpressError::Internal {
            message: format!("handler for '{}' failed", event),
            source: Some(Box::new(e)),
            context: ErrorContext::new("socket")
                .with_operation("dispatch")
                .with_metadata("socket_id", socket.id())
                .with_metadata("event", &event),
        }
        .log();
    }
}
