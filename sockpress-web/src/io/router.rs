//! Event registration for a namespace
//!
//! ```ignore
//! let root = io.router();
//! root.route("PING", |socket, _| async move {
//!     socket.emit("PONG", "Hi, I am the server");
//! })?;
//!
//! // registered as "route join room"
//! root.scope("route")?.route("join room", join_room)?;
//! ```

use super::namespace::Namespace;
use super::packet::is_reserved;
use super::socket::Socket;
use futures_util::future::BoxFuture;
use serde_json::Value;
use sockpress_core::{validation_error, SockpressResult};
use std::future::Future;
use std::sync::Arc;

pub(crate) type EventHandler =
    Arc<dyn Fn(Socket, Option<Value>) -> BoxFuture<'static, ()> + Send + Sync>;
pub(crate) type ConnectHandler = Arc<dyn Fn(Socket) -> BoxFuture<'static, ()> + Send + Sync>;
pub(crate) type DisconnectHandler =
    Arc<dyn Fn(Socket, String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Registers handlers on one namespace, optionally under an event prefix
#[derive(Debug, Clone)]
pub struct IoRouter {
    namespace: Arc<Namespace>,
    prefix: Option<String>,
}

impl IoRouter {
    pub(crate) fn new(namespace: Arc<Namespace>) -> Self {
        Self {
            namespace,
            prefix: None,
        }
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Full event name `event` registers under
    pub fn event_name(&self, event: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{} {}", prefix, event),
            None => event.to_string(),
        }
    }

    /// Handle `event` on this namespace. Handlers of one connection run in arrival order.
    pub fn route<F, Fut>(&self, event: &str, handler: F) -> SockpressResult<&Self>
    where
        F: Fn(Socket, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        validate_event_name(event)?;
        let name = self.event_name(event);
        let handler: EventHandler =
            Arc::new(move |socket: Socket, data: Option<Value>| -> BoxFuture<'static, ()> {
                Box::pin(handler(socket, data))
            });
        self.namespace.add_handler(name, handler)?;
        Ok(self)
    }

    /// Registrar whose events are named `"{prefix} {event}"`; scopes nest
    pub fn scope(&self, prefix: &str) -> SockpressResult<IoRouter> {
        validate_event_name(prefix)?;
        Ok(Self {
            namespace: Arc::clone(&self.namespace),
            prefix: Some(self.event_name(prefix)),
        })
    }

    /// Runs for every new connection, before its first event is dispatched
    pub fn on_connect<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn(Socket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.namespace.add_connect_handler(Arc::new(
            move |socket: Socket| -> BoxFuture<'static, ()> { Box::pin(handler(socket)) },
        ));
        self
    }

    /// Runs after a connection closed; receives the close reason
    pub fn on_disconnect<F, Fut>(&self, handler: F) -> &Self
    where
        F: Fn(Socket, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.namespace.add_disconnect_handler(Arc::new(
            move |socket: Socket, reason: String| -> BoxFuture<'static, ()> {
                Box::pin(handler(socket, reason))
            },
        ));
        self
    }
}

fn validate_event_name(event: &str) -> SockpressResult<()> {
    if event.is_empty() {
        return Err(validation_error!("event name must not be empty", "event", "io"));
    }
    if event.trim() != event {
        return Err(validation_error!(
            format!("event name '{}' has surrounding whitespace", event),
            "event",
            "io"
        ));
    }
    if is_reserved(event) {
        return Err(validation_error!(
            format!("event name '{}' is reserved", event),
            "event",
            "io"
        ));
    }
    Ok(())
}
