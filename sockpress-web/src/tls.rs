//! HTTPS support
//!
//! Certificates come from PEM files when configured, otherwise a self-signed
//! certificate is generated at startup for the configured host names.

use crate::WebResult;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, private_key};
use sockpress_core::{config_error, tls_error, TlsConfig};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info, warn};

const DEFAULT_SELF_SIGNED_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

fn open_pem(path: &Path) -> WebResult<std::io::BufReader<std::fs::File>> {
    let file = std::fs::File::open(path).map_err(|e| {
        tls_error!(format!("cannot open {}", path.display()), "tls", e)
    })?;
    Ok(std::io::BufReader::new(file))
}

fn load_cert_chain(path: &Path) -> WebResult<Vec<CertificateDer<'static>>> {
    let mut reader = open_pem(path)?;
    let cert_chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error!(format!("invalid PEM in {}", path.display()), "tls", e))?;
    if cert_chain.is_empty() {
        return Err(tls_error!(format!("no certificates found in {}", path.display()), "tls").into());
    }
    Ok(cert_chain)
}

fn load_private_key(path: &Path) -> WebResult<PrivateKeyDer<'static>> {
    let mut reader = open_pem(path)?;
    let key = private_key(&mut reader)
        .map_err(|e| tls_error!(format!("invalid PEM in {}", path.display()), "tls", e))?;
    key.ok_or_else(|| {
        tls_error!(format!("no private key found in {}", path.display()), "tls").into()
    })
}

/// Self-signed certificate and its PKCS#8 key for `hosts`
pub fn self_signed(
    hosts: &[String],
) -> WebResult<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let hosts: Vec<String> = if hosts.is_empty() {
        DEFAULT_SELF_SIGNED_HOSTS.iter().map(|h| h.to_string()).collect()
    } else {
        hosts.to_vec()
    };

    let generation_failed = |e: rcgen::Error| tls_error!("certificate generation failed", "tls", e);
    let key_pair = rcgen::KeyPair::generate().map_err(generation_failed)?;
    let cert = rcgen::CertificateParams::new(hosts.clone())
        .map_err(generation_failed)?
        .self_signed(&key_pair)
        .map_err(generation_failed)?;

    info!(hosts = ?hosts, "Generated self-signed certificate");
    Ok((
        vec![cert.der().clone()],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    ))
}

/// rustls server configuration for `tls`
pub fn server_config(tls: &TlsConfig) -> WebResult<Arc<ServerConfig>> {
    let (cert_chain, key) = match (&tls.cert_path, &tls.key_path) {
        (Some(cert), Some(key)) => {
            debug!(cert = %cert, key = %key, "Loading TLS certificate");
            (
                load_cert_chain(Path::new(cert))?,
                load_private_key(Path::new(key))?,
            )
        }
        (None, None) => self_signed(&tls.self_signed_hosts)?,
        _ => {
            return Err(
                config_error!("tls.cert_path and tls.key_path must be set together", "tls").into(),
            )
        }
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error!("no usable protocol versions", "tls", e))?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| tls_error!("certificate and key do not match", "tls", e))?;
    // WebSocket upgrades need HTTP/1.1
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Accept TLS connections on `listener` until `shutdown` resolves
pub async fn serve_tls<F>(
    listener: TcpListener,
    tls: Arc<ServerConfig>,
    app: Router,
    shutdown: F,
) -> WebResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let acceptor = TlsAcceptor::from(tls);
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(peer = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
                app.clone().oneshot(request.map(axum::body::Body::new))
            });
            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
            {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        });
    }

    info!("TLS listener stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WebError;
    use sockpress_core::SockpressError;

    #[test]
    fn test_self_signed_config() {
        let config = server_config(&TlsConfig {
            enabled: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn test_pem_files_round_trip() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        assert_eq!(load_cert_chain(&cert_path).unwrap().len(), 1);
        assert!(load_private_key(&key_path).is_ok());
        assert!(server_config(&TlsConfig {
            enabled: true,
            cert_path: Some(cert_path.display().to_string()),
            key_path: Some(key_path.display().to_string()),
            self_signed_hosts: Vec::new(),
        })
        .is_ok());
    }

    #[test]
    fn test_half_configured_files_are_rejected() {
        let config = TlsConfig {
            enabled: true,
            cert_path: Some("cert.pem".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            server_config(&config),
            Err(WebError::Core(SockpressError::Config { .. }))
        ));
    }

    #[test]
    fn test_missing_or_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.pem");
        std::fs::write(&empty, "").unwrap();

        for result in [
            load_cert_chain(&dir.path().join("missing.pem")).map(|_| ()),
            load_cert_chain(&empty).map(|_| ()),
            load_private_key(&empty).map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(WebError::Core(SockpressError::Tls { .. }))
            ));
        }
    }
}
