//! Sockpress Web Server
//!
//! Binds the listener, runs the session store lifecycle and serves the assembled
//! application over HTTP or HTTPS.

use crate::{tls, Sockpress, WebError, WebResult};
use sockpress_core::SockpressConfig;
use sockpress_session::SessionStore;
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Line written to stdout once the listener accepts connections
pub const READY_LINE: &str = "READY";

/// Main Sockpress server
pub struct SockpressServer {
    app: Sockpress,
}

impl SockpressServer {
    pub fn new(app: Sockpress) -> Self {
        Self { app }
    }

    /// Get server configuration
    pub fn config(&self) -> &SockpressConfig {
        self.app.config()
    }

    pub fn app(&self) -> &Sockpress {
        &self.app
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn start(self) -> WebResult<()> {
        let address = self.config().server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            error!(address = %address, error = %e, "Failed to bind");
            WebError::Server(e)
        })?;

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> WebResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.app.config().clone();
        let tls_config = if config.tls.enabled {
            Some(tls::server_config(&config.tls)?)
        } else {
            None
        };

        let store = self
            .app
            .session_bridge()
            .map(|bridge| Arc::clone(bridge.store()));
        if let Some(store) = &store {
            store.init().await?;
        }
        let cleanup = store.as_ref().map(|store| {
            spawn_cleanup(
                Arc::clone(store),
                Duration::from_secs(config.session.cleanup_interval_secs.max(1)),
            )
        });

        let router = self.app.into_router();
        let local_addr = listener.local_addr()?;
        let scheme = if tls_config.is_some() { "https" } else { "http" };
        info!(
            address = %format!("{}://{}", scheme, local_addr),
            sessions = config.session.enabled,
            "Server listening"
        );
        if config.server.announce_ready {
            announce_ready();
        }

        let result = match tls_config {
            Some(tls_config) => tls::serve_tls(listener, tls_config, router, shutdown).await,
            None => axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(WebError::Server),
        };

        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }
        if let Some(store) = store {
            if let Err(e) = store.shutdown().await {
                warn!(error = %e, "Session store shutdown failed");
            }
        }
        if let Err(e) = &result {
            error!(error = %e, "Server error");
        }
        info!("Server stopped");
        result
    }

    /// Serve on `listener` in the background
    pub async fn spawn(self, listener: TcpListener) -> WebResult<ServerHandle> {
        let local_addr = listener.local_addr()?;
        let secure = self.config().tls.enabled;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(self.serve(listener, async move {
            let _ = shutdown_rx.await;
        }));

        Ok(ServerHandle {
            local_addr,
            secure,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

fn announce_ready() {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", READY_LINE);
    let _ = stdout.flush();
}

/// Periodically drop expired session records
fn spawn_cleanup(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => debug!("Session cleanup found nothing to remove"),
                Ok(removed) => info!(removed, "Removed expired sessions"),
                Err(e) => warn!(error = %e, "Session cleanup failed"),
            }
        }
    })
}

/// A server running in the background
pub struct ServerHandle {
    local_addr: SocketAddr,
    secure: bool,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<WebResult<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Absolute URL of `path` on this server
    pub fn url(&self, path: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.local_addr, path)
    }

    /// Stop accepting connections and wait for the server task
    pub async fn shutdown(mut self) -> WebResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(WebError::Server(std::io::Error::other(e))),
        }
    }
}

/// Builder for SockpressServer
pub struct SockpressServerBuilder {
    config: SockpressConfig,
}

impl SockpressServerBuilder {
    pub fn new(config: SockpressConfig) -> Self {
        Self { config }
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn sessions(mut self, enabled: bool) -> Self {
        self.config.session.enabled = enabled;
        self
    }

    pub fn tls(mut self, enabled: bool) -> Self {
        self.config.tls.enabled = enabled;
        self
    }

    /// Certificate and key PEM files; without them a self-signed certificate is used
    pub fn tls_files<S: Into<String>>(mut self, cert: S, key: S) -> Self {
        self.config.tls.cert_path = Some(cert.into());
        self.config.tls.key_path = Some(key.into());
        self
    }

    pub fn announce_ready(mut self, announce: bool) -> Self {
        self.config.server.announce_ready = announce;
        self
    }

    /// Build the server around the application `setup` creates from the final config
    pub fn build_with<F>(self, setup: F) -> WebResult<SockpressServer>
    where
        F: FnOnce(SockpressConfig) -> WebResult<Sockpress>,
    {
        Ok(SockpressServer::new(setup(self.config)?))
    }

    /// Build a server with no routes registered
    pub fn build(self) -> WebResult<SockpressServer> {
        self.build_with(Sockpress::new)
    }
}
