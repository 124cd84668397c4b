//! Application registrar
//!
//! [`Sockpress`] collects HTTP routes and real-time event handlers, then assembles one
//! axum [`Router`] where HTTP routes run behind the session middleware and the io
//! endpoint reads the same cookie on its own.

use crate::io::Io;
use crate::{middleware::session_middleware, routes, WebResult};
use axum::{
    handler::Handler,
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{self, MethodRouter},
    Router,
};
use sockpress_core::{config_error, validation_error, SockpressConfig};
use sockpress_session::{bridge_from_config, SessionBridge};
use std::collections::HashSet;
use std::path::Path;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{debug, info};

pub struct Sockpress {
    config: SockpressConfig,
    router: Router,
    registered: HashSet<(String, String)>,
    bridge: Option<SessionBridge>,
    io: Io,
}

impl std::fmt::Debug for Sockpress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sockpress")
            .field("routes", &self.registered.len())
            .field("io", &self.io)
            .finish_non_exhaustive()
    }
}

impl Sockpress {
    /// Validate `config` and set up the session bridge (when enabled) and the io layer
    pub fn new(config: SockpressConfig) -> WebResult<Self> {
        config.validate()?;

        let bridge = if config.session.enabled {
            Some(bridge_from_config(&config.session)?)
        } else {
            None
        };
        let io = Io::new(bridge.clone(), config.io.channel_capacity);

        info!(
            sessions = config.session.enabled,
            store = ?config.session.store,
            io_path = %config.io.path,
            "Application created"
        );

        Ok(Self {
            config,
            router: Router::new(),
            registered: HashSet::new(),
            bridge,
            io,
        })
    }

    pub fn config(&self) -> &SockpressConfig {
        &self.config
    }

    pub fn io(&self) -> &Io {
        &self.io
    }

    pub fn session_bridge(&self) -> Option<&SessionBridge> {
        self.bridge.as_ref()
    }

    /// Register a full method router at `path`
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> WebResult<&mut Self> {
        self.claim(path, "*")?;
        self.router = std::mem::take(&mut self.router).route(path, method_router);
        Ok(self)
    }

    pub fn get<H, T>(&mut self, path: &str, handler: H) -> WebResult<&mut Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.method(Method::GET, path, routing::get(handler))
    }

    pub fn post<H, T>(&mut self, path: &str, handler: H) -> WebResult<&mut Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.method(Method::POST, path, routing::post(handler))
    }

    pub fn put<H, T>(&mut self, path: &str, handler: H) -> WebResult<&mut Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.method(Method::PUT, path, routing::put(handler))
    }

    pub fn delete<H, T>(&mut self, path: &str, handler: H) -> WebResult<&mut Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.method(Method::DELETE, path, routing::delete(handler))
    }

    /// Serve the files under `dir` below `mount`
    pub fn static_dir(&mut self, mount: &str, dir: impl AsRef<Path>) -> WebResult<&mut Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(config_error!(
                format!("static directory '{}' does not exist", dir.display()),
                "router"
            )
            .into());
        }
        self.claim(mount, "*")?;

        let service = ServeDir::new(dir);
        let router = std::mem::take(&mut self.router);
        self.router = if mount == "/" {
            router.fallback_service(service)
        } else {
            router.nest_service(mount, service)
        };
        debug!(mount, dir = %dir.display(), "Serving static directory");
        Ok(self)
    }

    fn method(&mut self, method: Method, path: &str, route: MethodRouter) -> WebResult<&mut Self> {
        self.claim(path, method.as_str())?;
        self.router = std::mem::take(&mut self.router).route(path, route);
        Ok(self)
    }

    /// Reject malformed paths and overlapping registrations before axum sees them
    fn claim(&mut self, path: &str, method: &str) -> WebResult<()> {
        validate_path(path)?;

        let taken = self.registered.contains(&(path.to_string(), "*".to_string()))
            || self.registered.contains(&(path.to_string(), method.to_string()))
            || (method == "*" && self.registered.iter().any(|(p, _)| p == path));
        if taken {
            return Err(validation_error!(
                format!("route {} {} is already registered", method, path),
                "path",
                "router"
            )
            .into());
        }

        debug!(method, path, "Registered route");
        self.registered.insert((path.to_string(), method.to_string()));
        Ok(())
    }

    /// Assemble the final router
    pub fn into_router(self) -> Router {
        let mut http = self.router;
        if let Some(bridge) = self.bridge {
            http = http.layer(from_fn_with_state(bridge, session_middleware));
        }

        let mut app = http
            .merge(routes::io_routes(self.io, &self.config.io.path))
            .layer(TraceLayer::new_for_http());

        let origins: Vec<HeaderValue> = self
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        if !origins.is_empty() {
            app = app.layer(
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                    .allow_credentials(true),
            );
        }
        app
    }
}

fn validate_path(path: &str) -> WebResult<()> {
    if !path.starts_with('/') {
        return Err(validation_error!(
            format!("path '{}' must start with '/'", path),
            "path",
            "router"
        )
        .into());
    }
    if path.chars().any(char::is_whitespace) {
        return Err(validation_error!(
            format!("path '{}' contains whitespace", path),
            "path",
            "router"
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use crate::WebError;
    use sockpress_core::SockpressError;
    use tower::ServiceExt;

    fn app() -> Sockpress {
        Sockpress::new(SockpressConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_bad_paths() {
        let mut app = app();
        assert!(matches!(
            app.get("foo", || async { "bar" }),
            Err(WebError::Core(_))
        ));
        assert!(app.get("/a b", || async { "bar" }).is_err());
    }

    #[test]
    fn test_rejects_overlapping_routes() {
        let mut app = app();
        app.get("/foo", || async { "bar" }).unwrap();
        app.post("/foo", || async { "posted" }).unwrap();

        assert!(app.get("/foo", || async { "again" }).is_err());
        assert!(app.route("/foo", routing::put(|| async { "put" })).is_err());
    }

    #[test]
    fn test_static_dir_must_exist() {
        let mut app = app();
        assert!(matches!(
            app.static_dir("/assets", "/definitely/not/here"),
            Err(WebError::Core(SockpressError::Config { .. }))
        ));
    }

    #[tokio::test]
    async fn test_registered_routes_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello").unwrap();

        let mut app = app();
        app.get("/foo", || async { "bar" })
            .unwrap()
            .static_dir("/assets", dir.path())
            .unwrap();
        let router = app.into_router();

        let response = router
            .clone()
            .oneshot(Request::get("/foo").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/assets/hello.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
