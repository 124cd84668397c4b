//! Integration tests for sockpress-core infrastructure

use sockpress_core::{
    config_error, init_logging, not_found_error, tls_error, validation_error, ErrorContext, LogFormat,
    LogTarget, LoggingConfig, SockpressConfig, SockpressError, StoreKind,
};
use std::io::Write;

#[test]
fn test_error_handling() {
    let error = not_found_error!("namespace /chat", "io");

    match &error {
        SockpressError::NotFound { resource, context } => {
            assert_eq!(resource, "namespace /chat");
            assert_eq!(context.component, "io");
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected NotFound error"),
    }

    // Logging must not panic without a subscriber
    error.log();

    let transport = SockpressError::Transport {
        message: "socket closed".to_string(),
        source: None,
        context: ErrorContext::new("socket").with_metadata("socket_id", "abc"),
    };
    assert_eq!(
        transport.context().unwrap().metadata.get("socket_id").map(String::as_str),
        Some("abc")
    );
    transport.log();

    let tls = tls_error!(
        "failed to read certificate",
        "tls",
        std::io::Error::new(std::io::ErrorKind::NotFound, "cert.pem")
    );
    assert!(std::error::Error::source(&tls).is_some());
    assert!(tls.to_string().starts_with("TLS error"));

    let config = config_error!("Invalid config", "test");
    assert_eq!(
        config.context().map(|c| c.recovery_suggestions.len()),
        Some(2)
    );

    let validation = validation_error!("bad", "event", "test");
    assert!(validation.to_string().starts_with("Validation error"));
}

#[test]
fn test_config_file_loading() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
host = "0.0.0.0"
port = 8443
announce_ready = false

[session]
secret = "keyboard cat"
max_age_secs = 600

[tls]
enabled = true
self_signed_hosts = ["localhost"]

[logging]
level = "debug"
format = "json"
target = "stderr"
"#
    )
    .unwrap();

    let config = SockpressConfig::from_file(file.path()).unwrap();
    assert_eq!(config.server.address(), "0.0.0.0:8443");
    assert!(!config.server.announce_ready);
    assert_eq!(config.session.secret, "keyboard cat");
    assert_eq!(config.session.max_age_secs, 600);
    assert_eq!(config.session.store, StoreKind::Memory);
    assert!(config.tls.enabled);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.target, LogTarget::Stderr);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_file_errors() {
    let missing = SockpressConfig::from_file("/definitely/not/here.toml");
    assert!(matches!(missing, Err(SockpressError::Config { .. })));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server\nport = ").unwrap();
    let broken = SockpressConfig::from_file(file.path());
    match broken {
        Err(SockpressError::Config { context, .. }) => {
            assert_eq!(context.operation.as_deref(), Some("parse_toml"));
        }
        other => panic!("Expected parse failure, got {other:?}"),
    }
}

#[test]
fn test_logging_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sockpress.log");
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        target: LogTarget::File,
        file_path: Some(log_path.display().to_string()),
        filter_directives: vec!["sockpress_core=debug".to_string()],
        ..Default::default()
    };

    assert!(init_logging(&config).is_ok());
    tracing::info!(target: "sockpress_core", "written to file");
    assert!(log_path.exists());

    // The global subscriber can only be installed once per process
    assert!(init_logging(&config).is_err());
}
