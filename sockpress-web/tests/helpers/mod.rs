//! Test harness: the demo server on an ephemeral port plus HTTP and socket clients

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use reqwest::cookie::{CookieStore, Jar};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde_json::{json, Value};
use sockpress_core::SockpressConfig;
use sockpress_web::demo::{self, Variant};
use sockpress_web::{Io, ServerHandle, SockpressServer};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async, WebSocketStream};

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(3);

// Initialise tracing once per test binary
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

/// Running demo server
pub struct TestApp {
    pub handle: ServerHandle,
    pub io: Io,
}

impl TestApp {
    pub async fn spawn(variant: Variant) -> Self {
        LazyLock::force(&TRACING);

        let mut config = SockpressConfig::default();
        config.server.announce_ready = false;
        variant.apply(&mut config);

        let app = demo::build(config).expect("demo app builds");
        let io = app.io().clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = SockpressServer::new(app)
            .spawn(listener)
            .await
            .expect("server starts");

        Self { handle, io }
    }

    pub fn url(&self, path: &str) -> String {
        self.handle.url(path)
    }

    pub fn ws_url(&self, nsp: &str) -> String {
        let scheme = if self.url("/").starts_with("https://") {
            "wss"
        } else {
            "ws"
        };
        format!("{}://{}/socket.io/?nsp={}", scheme, self.handle.local_addr(), nsp)
    }

    /// HTTP client whose cookie jar can be shared with sockets
    pub fn http_client(&self) -> (reqwest::Client, Arc<Jar>) {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap();
        (client, jar)
    }

    /// `Cookie` header value the jar would send to this server
    pub fn cookie_header(&self, jar: &Jar) -> Option<HeaderValue> {
        let url: reqwest::Url = self.url("/").parse().unwrap();
        jar.cookies(&url)
            .map(|value| HeaderValue::from_bytes(value.as_bytes()).unwrap())
    }

    pub async fn get_text(&self, client: &reqwest::Client, path: &str) -> (u16, String) {
        let response = client.get(self.url(path)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    /// Connect to namespace `nsp` and consume its welcome event
    pub async fn connect(&self, nsp: &str, cookie: Option<HeaderValue>) -> TestSocket {
        let mut socket = TestSocket::connect(&self.ws_url(nsp), cookie).await;
        let welcome = if nsp == "/" { "welcome" } else { "welcome namespace" };
        socket.expect(welcome).await;
        socket
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await.unwrap();
    }
}

/// Plain TCP or TLS underneath a test socket
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Accepts the server's self-signed certificate, still checking handshake signatures
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn insecure_tls_connector() -> TlsConnector {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

pub struct TestSocket {
    stream: WebSocketStream<Box<dyn Transport>>,
}

impl TestSocket {
    /// Connect to a `ws://` or `wss://` url
    pub async fn connect(url: &str, cookie: Option<HeaderValue>) -> Self {
        let mut request = url.into_client_request().unwrap();
        if let Some(cookie) = cookie {
            request.headers_mut().insert(COOKIE, cookie);
        }

        let authority = request.uri().authority().unwrap().as_str().to_string();
        let tcp = TcpStream::connect(&authority).await.expect("tcp connects");
        let transport: Box<dyn Transport> = if request.uri().scheme_str() == Some("wss") {
            let tls = insecure_tls_connector()
                .connect(ServerName::try_from("localhost").unwrap(), tcp)
                .await
                .expect("tls handshake succeeds");
            Box::new(tls)
        } else {
            Box::new(tcp)
        };

        let (stream, _) = client_async(request, transport)
            .await
            .expect("websocket connects");
        Self { stream }
    }

    pub async fn emit(&mut self, event: &str, data: Option<Value>) {
        let packet = match data {
            Some(data) => json!({ "event": event, "data": data }),
            None => json!({ "event": event }),
        };
        self.stream
            .send(Message::Text(packet.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Next packet, `None` on close or when nothing arrives within `wait`
    pub async fn next_packet(&mut self, wait: Duration) -> Option<(String, Option<Value>)> {
        loop {
            let message = tokio::time::timeout(wait, self.stream.next()).await.ok()??;
            match message {
                Ok(Message::Text(text)) => {
                    let packet: Value = serde_json::from_str(text.as_str()).unwrap();
                    let event = packet["event"].as_str().unwrap().to_string();
                    return Some((event, packet.get("data").cloned()));
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Payload of the next packet, which must be `event`
    pub async fn expect(&mut self, event: &str) -> Option<Value> {
        match self.next_packet(RECEIVE_TIMEOUT).await {
            Some((received, data)) => {
                assert_eq!(received, event, "unexpected event");
                data
            }
            None => panic!("expected '{event}' but nothing arrived"),
        }
    }

    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Some((event, data)) = self.next_packet(wait).await {
            panic!("expected silence, got '{event}' with {data:?}");
        }
    }

    /// The server closes the connection
    pub async fn expect_closed(&mut self) {
        let closed = tokio::time::timeout(RECEIVE_TIMEOUT, async {
            loop {
                match self.stream.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "server did not close the connection");
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Poll `check` until it holds or a few seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..60 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
