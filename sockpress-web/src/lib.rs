//! Sockpress Web
//!
//! HTTP routing fused with a real-time event layer. Both sides share one session
//! record per client through the signed session cookie.

pub mod app;
pub mod demo;
pub mod handlers;
pub mod io;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod templates;
pub mod tls;

// Re-export main types
pub use app::Sockpress;
pub use io::{BroadcastOperator, Io, IoRouter, Namespace, Socket};
pub use middleware::Session;
pub use server::{ServerHandle, SockpressServer, SockpressServerBuilder};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sockpress_core::SockpressError;
use sockpress_session::SessionError;
use tracing::error;

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Sessions are not enabled on this server")]
    SessionUnavailable,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Core(#[from] SockpressError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match &self {
            WebError::SessionUnavailable => {}
            WebError::Core(e) => e.log(),
            other => error!(error = %other, "Request failed"),
        }
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
