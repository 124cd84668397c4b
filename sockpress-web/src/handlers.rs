//! HTTP handlers shipped with the framework

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};

static CLIENT_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

pub const CLIENT_SCRIPT: &str = "socket.io.js";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Browser client for the event protocol
pub async fn client_script() -> Response {
    match CLIENT_ASSETS.get_file(CLIENT_SCRIPT) {
        Some(file) => (
            [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
            file.contents(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "client script not bundled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_script_is_bundled() {
        let file = CLIENT_ASSETS.get_file(CLIENT_SCRIPT).unwrap();
        let source = file.contents_utf8().unwrap();
        assert!(source.contains("function io("));
    }

    #[tokio::test]
    async fn test_health_check() {
        let Json(health) = health_check().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }
}
