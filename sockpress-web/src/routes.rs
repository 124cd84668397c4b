//! Route tables assembled by the application

use crate::{handlers, io};
use axum::{routing::get, Router};

/// Routes of the real-time layer mounted at `io_path` (e.g. `/socket.io`):
/// the WebSocket endpoint at `{io_path}/` and the browser client script.
///
/// These routes stay outside the session middleware; the handshake only
/// resolves an existing cookie and never creates a session.
pub fn io_routes(io: io::Io, io_path: &str) -> Router {
    Router::new()
        .route(&format!("{}/", io_path), get(io::io_endpoint))
        .route(io_path, get(io::io_endpoint))
        .route(
            &format!("{}/{}", io_path, handlers::CLIENT_SCRIPT),
            get(handlers::client_script),
        )
        .with_state(io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_client_script_route() {
        let app = io_routes(io::Io::new(None, 8), "/socket.io");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/socket.io/socket.io.js")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/javascript"));
    }

    #[tokio::test]
    async fn test_plain_get_on_endpoint_is_refused() {
        let app = io_routes(io::Io::new(None, 8), "/socket.io");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/socket.io/")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
