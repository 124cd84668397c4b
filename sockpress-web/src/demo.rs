//! Demo application
//!
//! The routes and events the `sockpress-demo` binary serves. Integration tests drive
//! it over real HTTP and WebSocket connections.

use crate::handlers::health_check;
use crate::io::{Io, IoRouter, Socket};
use crate::middleware::Session;
use crate::templates::TestHarnessTemplate;
use crate::{Sockpress, WebResult};
use askama::Template;
use axum::response::Html;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sockpress_core::{SockpressConfig, SockpressResult};
use tracing::debug;

/// Server flavours the demo binary can start
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Variant {
    /// Plain HTTP with sessions
    Http,
    /// Plain HTTP, sessions disabled
    #[value(name = "noSession")]
    NoSession,
    /// HTTPS with sessions
    Https,
}

impl Variant {
    pub fn apply(self, config: &mut SockpressConfig) {
        match self {
            Variant::Http => {
                config.session.enabled = true;
                config.tls.enabled = false;
            }
            Variant::NoSession => {
                config.session.enabled = false;
                config.tls.enabled = false;
            }
            Variant::Https => {
                config.session.enabled = true;
                config.tls.enabled = true;
            }
        }
    }
}

/// Payload of `set_session` and reply of `get_session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParam {
    pub param: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Build the demo application on top of `config`
pub fn build(config: SockpressConfig) -> WebResult<Sockpress> {
    let harness = TestHarnessTemplate {
        title: "Sockpress test harness".to_string(),
        io_path: config.io.path.clone(),
        sessions_enabled: config.session.enabled,
    }
    .render()?;

    let mut app = Sockpress::new(config)?;
    app.get("/foo", || async { "bar" })?
        .get("/increment", increment)?
        .get("/health", health_check)?
        .get("/test.html", move || {
            let page = harness.clone();
            async move { Html(page) }
        })?;

    register_events(app.io())?;
    Ok(app)
}

async fn increment(session: Session) -> String {
    let next = session.get_as::<u64>("counter").await.unwrap_or(0) + 1;
    session.set("counter", next).await;
    next.to_string()
}

fn register_events(io: &Io) -> SockpressResult<()> {
    let root = io.router();

    root.on_connect(|socket: Socket| async move {
        socket.emit("welcome", "welcome");
    });

    root.route("PING", |socket, _| async move {
        socket.emit("PONG", "Hi, I am the server");
    })?
    .route("get_session", |socket, param| async move {
        let Some(param) = param.as_ref().and_then(Value::as_str).map(str::to_owned) else {
            debug!(socket_id = %socket.id(), "get_session without a parameter name");
            return;
        };
        let value = socket.session_get(&param).await;
        socket.emit("session_param", SessionParam { param, value });
    })?
    .route("set_session", |socket, data| async move {
        let Some(SessionParam { param, value }) =
            data.and_then(|data| serde_json::from_value(data).ok())
        else {
            debug!(socket_id = %socket.id(), "set_session with malformed payload");
            return;
        };
        socket
            .session_set(&param, value.unwrap_or(Value::Null))
            .await;
    })?
    .route("simple route", |socket, _| async move {
        socket.emit("simple route ok", ());
    })?
    .route("another simple route", |socket, _| async move {
        socket.emit("another simple route ok", json!({ "foo": "bar" }));
    })?;

    register_room_events(&root)?;
    register_room_events(&root.scope("route")?)?;

    let namespace = io.of("/namespace")?;
    namespace.on_connect(|socket: Socket| async move {
        socket.emit("welcome namespace", ());
    });
    namespace.route("ping namespace", |socket, data| async move {
        socket.emit("pong namespace", data);
    })?;

    Ok(())
}

/// Events registered both bare and under the `route` prefix
fn register_room_events(router: &IoRouter) -> SockpressResult<()> {
    router
        .route("disconnect me", |socket, _| async move {
            socket.disconnect().await;
        })?
        .route("broadcast message", |socket, message| async move {
            socket.broadcast().emit("broadcasted message", message);
        })?
        .route("join room", |socket, room| async move {
            let Some(room) = room.as_ref().and_then(Value::as_str) else {
                return;
            };
            socket.join(room);
            socket.emit("room joined", room);
            socket.within(room).emit("room joined", room);
        })?;
    Ok(())
}
