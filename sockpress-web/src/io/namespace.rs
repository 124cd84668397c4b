//! Namespaces, rooms and broadcast fan-out

use super::router::{ConnectHandler, DisconnectHandler, EventHandler};
use super::socket::{encode_frame, Outbound, Outlet};
use axum::extract::ws::Utf8Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use sockpress_core::{validation_error, SockpressResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// An isolated group of sockets with its own event table and rooms
pub struct Namespace {
    path: String,
    handlers: RwLock<HashMap<String, EventHandler>>,
    connect_handlers: RwLock<Vec<ConnectHandler>>,
    disconnect_handlers: RwLock<Vec<DisconnectHandler>>,
    sockets: RwLock<HashMap<String, Arc<Outlet>>>,
    rooms: RwLock<HashMap<String, HashSet<String>>>,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("path", &self.path)
            .field("sockets", &self.socket_count())
            .finish_non_exhaustive()
    }
}

impl Namespace {
    pub(crate) fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            handlers: RwLock::new(HashMap::new()),
            connect_handlers: RwLock::new(Vec::new()),
            disconnect_handlers: RwLock::new(Vec::new()),
            sockets: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn add_handler(&self, event: String, handler: EventHandler) -> SockpressResult<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&event) {
            return Err(validation_error!(
                format!("event '{}' is already registered on namespace '{}'", event, self.path),
                "event",
                "io"
            ));
        }
        debug!(namespace = %self.path, event = %event, "Registered event handler");
        handlers.insert(event, handler);
        Ok(())
    }

    pub(crate) fn handler(&self, event: &str) -> Option<EventHandler> {
        self.handlers.read().get(event).cloned()
    }

    /// Registered event names, sorted
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.handlers.read().keys().cloned().collect();
        events.sort();
        events
    }

    pub(crate) fn add_connect_handler(&self, handler: ConnectHandler) {
        self.connect_handlers.write().push(handler);
    }

    pub(crate) fn connect_handlers(&self) -> Vec<ConnectHandler> {
        self.connect_handlers.read().clone()
    }

    pub(crate) fn add_disconnect_handler(&self, handler: DisconnectHandler) {
        self.disconnect_handlers.write().push(handler);
    }

    pub(crate) fn disconnect_handlers(&self) -> Vec<DisconnectHandler> {
        self.disconnect_handlers.read().clone()
    }

    pub(crate) fn insert(&self, outlet: Arc<Outlet>) {
        self.sockets.write().insert(outlet.id().to_string(), outlet);
    }

    /// Drop the socket and its room memberships; rooms left empty disappear
    pub(crate) fn remove(&self, socket_id: &str) {
        self.sockets.write().remove(socket_id);
        self.rooms.write().retain(|_, members| {
            members.remove(socket_id);
            !members.is_empty()
        });
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.read().len()
    }

    pub(crate) fn join(&self, socket_id: &str, room: &str) {
        self.rooms
            .write()
            .entry(room.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    pub(crate) fn leave(&self, socket_id: &str, room: &str) {
        let mut rooms = self.rooms.write();
        if let Some(members) = rooms.get_mut(room) {
            members.remove(socket_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    pub(crate) fn rooms_of(&self, socket_id: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .rooms
            .read()
            .iter()
            .filter(|(_, members)| members.contains(socket_id))
            .map(|(room, _)| room.clone())
            .collect();
        rooms.sort();
        rooms
    }

    /// Rooms with at least one member, sorted
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.rooms.read().keys().cloned().collect();
        rooms.sort();
        rooms
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.read().get(room).map_or(0, HashSet::len)
    }

    /// Send to every connected socket; returns how many accepted the message
    pub fn emit<T: Serialize>(self: &Arc<Self>, event: &str, data: T) -> usize {
        BroadcastOperator::new(Arc::clone(self)).emit(event, data)
    }

    pub fn to(self: &Arc<Self>, room: &str) -> BroadcastOperator {
        BroadcastOperator::new(Arc::clone(self)).to(room)
    }

    /// Queue `frame` for the selected sockets. No rooms means the whole namespace.
    fn deliver(&self, rooms: &[String], except: Option<&str>, frame: Utf8Bytes) -> usize {
        let targets: Vec<Arc<Outlet>> = {
            let sockets = self.sockets.read();
            if rooms.is_empty() {
                sockets
                    .values()
                    .filter(|outlet| Some(outlet.id()) != except)
                    .cloned()
                    .collect()
            } else {
                let room_map = self.rooms.read();
                let members: HashSet<&str> = rooms
                    .iter()
                    .filter_map(|room| room_map.get(room))
                    .flat_map(|members| members.iter().map(String::as_str))
                    .collect();
                members
                    .into_iter()
                    .filter(|id| Some(*id) != except)
                    .filter_map(|id| sockets.get(id).cloned())
                    .collect()
            }
        };

        targets
            .iter()
            .filter(|outlet| outlet.send(Outbound::Frame(frame.clone())))
            .count()
    }
}

/// Targets for a broadcast: rooms (union) minus an excluded socket
#[derive(Debug, Clone)]
pub struct BroadcastOperator {
    namespace: Arc<Namespace>,
    rooms: Vec<String>,
    except: Option<String>,
}

impl BroadcastOperator {
    pub(crate) fn new(namespace: Arc<Namespace>) -> Self {
        Self {
            namespace,
            rooms: Vec::new(),
            except: None,
        }
    }

    /// Add a room; members of any chained room receive the message once
    pub fn to(mut self, room: &str) -> Self {
        if !self.rooms.iter().any(|r| r == room) {
            self.rooms.push(room.to_string());
        }
        self
    }

    pub(crate) fn except(mut self, socket_id: &str) -> Self {
        self.except = Some(socket_id.to_string());
        self
    }

    /// Returns the number of recipients
    pub fn emit<T: Serialize>(self, event: &str, data: T) -> usize {
        let Some(frame) = encode_frame(event, data) else {
            return 0;
        };
        let recipients = self
            .namespace
            .deliver(&self.rooms, self.except.as_deref(), frame);
        debug!(
            namespace = %self.namespace.path(),
            event,
            rooms = ?self.rooms,
            recipients,
            "Broadcast event"
        );
        recipients
    }
}
