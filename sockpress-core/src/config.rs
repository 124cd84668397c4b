//! Configuration management
//!
//! Defaults, then an optional TOML file, then `SOCKPRESS_*` environment variables.

use crate::error::{ErrorContext, SockpressError, SockpressResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SockpressConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub io: IoConfig,
    pub tls: TlsConfig,
    pub logging: LoggingConfig,
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Write `READY` to stdout once the listener is bound
    pub announce_ready: bool,
    /// Origins allowed to make credentialed cross-origin requests
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3333,
            announce_ready: true,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Backing store for session records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
}

/// HTTP session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub enabled: bool,
    pub cookie_name: String,
    /// HMAC secret used to sign the session cookie
    pub secret: String,
    /// Idle lifetime of a record, also sent as the cookie `Max-Age`
    pub max_age_secs: u64,
    pub secure_cookie: bool,
    pub store: StoreKind,
    /// Directory for the file store
    pub store_dir: Option<String>,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_name: "sockpress.sid".to_string(),
            secret: "sockpress-development-secret".to_string(),
            max_age_secs: 24 * 60 * 60,
            secure_cookie: false,
            store: StoreKind::Memory,
            store_dir: None,
            cleanup_interval_secs: 60 * 60,
        }
    }
}

/// Real-time layer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Mount point of the WebSocket endpoint and client script
    pub path: String,
    /// Outbound packets buffered per socket before messages are dropped
    pub channel_capacity: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            path: "/socket.io".to_string(),
            channel_capacity: 256,
        }
    }
}

/// TLS settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
    /// Host names put in a generated certificate when no PEM files are given
    pub self_signed_hosts: Vec<String>,
}

impl SockpressConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SockpressResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SockpressError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        toml::from_str(&content).map_err(|e| SockpressError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Apply `SOCKPRESS_*` environment variables on top of the current values
    pub fn apply_env(mut self) -> SockpressResult<Self> {
        if let Ok(host) = std::env::var("SOCKPRESS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("SOCKPRESS_PORT")? {
            self.server.port = port;
        }
        if let Some(enabled) = env_parse::<bool>("SOCKPRESS_SESSION")? {
            self.session.enabled = enabled;
        }
        if let Ok(secret) = std::env::var("SOCKPRESS_SESSION_SECRET") {
            self.session.secret = secret;
        }
        if let Ok(name) = std::env::var("SOCKPRESS_SESSION_COOKIE") {
            self.session.cookie_name = name;
        }
        if let Some(max_age) = env_parse::<u64>("SOCKPRESS_SESSION_MAX_AGE")? {
            self.session.max_age_secs = max_age;
        }
        if let Ok(dir) = std::env::var("SOCKPRESS_SESSION_DIR") {
            self.session.store = StoreKind::File;
            self.session.store_dir = Some(dir);
        }
        if let Some(enabled) = env_parse::<bool>("SOCKPRESS_TLS")? {
            self.tls.enabled = enabled;
        }
        if let Ok(cert) = std::env::var("SOCKPRESS_TLS_CERT") {
            self.tls.cert_path = Some(cert);
        }
        if let Ok(key) = std::env::var("SOCKPRESS_TLS_KEY") {
            self.tls.key_path = Some(key);
        }
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> SockpressResult<()> {
        if self.session.enabled {
            if self.session.secret.is_empty() {
                return Err(invalid("session.secret must not be empty", "Set session.secret"));
            }
            if !is_cookie_token(&self.session.cookie_name) {
                return Err(invalid(
                    "session.cookie_name is not a valid cookie name",
                    "Use letters, digits, '.', '-' or '_'",
                ));
            }
            if self.session.max_age_secs == 0 {
                return Err(invalid(
                    "session.max_age_secs must be greater than 0",
                    "Set session.max_age_secs to a positive value",
                ));
            }
            if self.session.store == StoreKind::File && self.session.store_dir.is_none() {
                return Err(invalid(
                    "session.store_dir is required for the file store",
                    "Set session.store_dir or use the memory store",
                ));
            }
        }

        if !self.io.path.starts_with('/') || self.io.path.len() < 2 || self.io.path.ends_with('/')
        {
            return Err(invalid(
                "io.path must start with '/' and must not end with '/'",
                "Use a mount point such as /socket.io",
            ));
        }
        if self.io.channel_capacity == 0 {
            return Err(invalid(
                "io.channel_capacity must be greater than 0",
                "Set io.channel_capacity to a positive value",
            ));
        }

        if self.tls.enabled && self.tls.cert_path.is_some() != self.tls.key_path.is_some() {
            return Err(invalid(
                "tls.cert_path and tls.key_path must be given together",
                "Provide both PEM files, or neither to generate a self-signed certificate",
            ));
        }

        Ok(())
    }
}

fn env_parse<T>(name: &str) -> SockpressResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| SockpressError::Config {
            message: format!("Invalid value for {}: {}", name, e),
            source: None,
            context: ErrorContext::new("config")
                .with_operation("apply_env")
                .with_metadata("variable", name),
        }),
        Err(_) => Ok(None),
    }
}

fn invalid(message: &str, suggestion: &str) -> SockpressError {
    SockpressError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}

fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
