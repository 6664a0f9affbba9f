//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WantsServerCert;
use rustls::{ConfigBuilder, DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use tls_balancer::config::{ProxyConfig, TargetConfig, TlsConfig};
use tls_balancer::lifecycle::{Application, Shutdown, StartupError};
use tls_balancer::pairing::PairRegistry;
use tls_balancer::load_balancer::TargetRegistry;

/// A TLS server with a self-signed certificate, running `handler` per connection.
pub struct TlsBackend {
    pub addr: SocketAddr,
    connections: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

/// Requires a client certificate, accepts any, and keeps what was presented.
#[derive(Debug)]
pub struct ClientCertRecorder {
    provider: Arc<CryptoProvider>,
    presented: Mutex<Vec<Vec<u8>>>,
}

impl ClientCertRecorder {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        Self {
            provider,
            presented: Mutex::new(Vec::new()),
        }
    }

    /// DER of every end-entity certificate presented so far.
    pub fn presented(&self) -> Vec<Vec<u8>> {
        self.presented.lock().unwrap().clone()
    }
}

impl ClientCertVerifier for ClientCertRecorder {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        self.presented.lock().unwrap().push(end_entity.as_ref().to_vec());
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

fn server_builder(provider: Arc<CryptoProvider>) -> ConfigBuilder<ServerConfig, rustls::WantsVerifier> {
    ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
}

fn finish_server_config(builder: ConfigBuilder<ServerConfig, WantsServerCert>) -> ServerConfig {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let certs = vec![CertificateDer::from(cert.cert.der().to_vec())];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()));
    builder.with_single_cert(certs, key).unwrap()
}

impl TlsBackend {
    pub async fn spawn<F, Fut>(handler: F) -> Self
    where
        F: Fn(TlsStream<TcpStream>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = finish_server_config(server_builder(provider).with_no_client_auth());
        Self::spawn_with_config(config, handler).await
    }

    /// An echo backend that demands a client certificate and records it.
    pub async fn echo_requiring_client_cert() -> (Self, Arc<ClientCertRecorder>) {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let recorder = Arc::new(ClientCertRecorder::new(provider.clone()));
        let config = finish_server_config(server_builder(provider).with_client_cert_verifier(recorder.clone()));
        let backend = Self::spawn_with_config(config, echo_handler).await;
        (backend, recorder)
    }

    async fn spawn_with_config<F, Fut>(config: ServerConfig, handler: F) -> Self
    where
        F: Fn(TlsStream<TcpStream>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let acceptor = TlsAcceptor::from(Arc::new(config));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let connections = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&connections);
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            counter.fetch_add(1, Ordering::Relaxed);
                            let (acceptor, handler) = (acceptor.clone(), Arc::clone(&handler));
                            tokio::spawn(async move {
                                if let Ok(tls) = acceptor.accept(stream).await {
                                    handler(tls).await;
                                }
                            });
                        }
                        Err(_) => break,
                    },
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            addr,
            connections,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Echo every byte back until the peer closes.
    pub async fn echo() -> Self {
        Self::spawn(echo_handler).await
    }

    /// `127.0.0.1:<port>`
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }
}

async fn echo_handler(mut tls: TlsStream<TcpStream>) {
    let mut buf = vec![0u8; 4096];
    loop {
        match tls.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tls.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

impl Drop for TlsBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Client certificate material on disk.
pub struct ClientCert {
    _dir: TempDir,
    pub tls: TlsConfig,
    pub der: Vec<u8>,
}

pub fn client_cert() -> ClientCert {
    let cert = rcgen::generate_simple_self_signed(vec!["balancer.local".to_string()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("client.pem");
    let key_path = dir.path().join("client.key");
    std::fs::write(&cert_path, cert.cert.pem()).unwrap();
    std::fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();

    ClientCert {
        _dir: dir,
        der: cert.cert.der().to_vec(),
        tls: TlsConfig {
            cert_path: cert_path.display().to_string(),
            key_path: key_path.display().to_string(),
        },
    }
}

/// An endpoint with nothing listening on it.
pub fn dead_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

pub fn config(cert: &ClientCert, targets: Vec<TargetConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.node.listen = "127.0.0.1:0".to_string();
    config.node.max_connections = 16;
    config.node.timeout_secs = 30;
    config.targets = targets;
    config.tls = cert.tls.clone();
    config.balancing.connect_timeout_secs = 2;
    config.shutdown.drain_timeout_secs = 1;
    config
}

/// A balancer running in the background.
pub struct RunningBalancer {
    pub addr: SocketAddr,
    pub admin_addr: Option<SocketAddr>,
    pub pairs: Arc<PairRegistry>,
    pub targets: Arc<TargetRegistry>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), StartupError>>,
}

pub async fn start_balancer(config: ProxyConfig) -> RunningBalancer {
    let app = Application::build(config).await.unwrap();
    let addr = app.local_addr().unwrap();
    let admin_addr = app.admin_addr();
    let pairs = app.pairs().clone();
    let targets = app.targets().clone();

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    let handle = tokio::spawn(async move { app.run(&trigger).await });
    // Let the accept loop subscribe before tests trigger shutdown.
    tokio::time::sleep(Duration::from_millis(50)).await;

    RunningBalancer {
        addr,
        admin_addr,
        pairs,
        targets,
        shutdown,
        handle,
    }
}

/// Connect and prove the pair works with an echo round trip.
pub async fn connect_echo(addr: SocketAddr) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"hello");
    client
}

/// Read until the balancer closes the connection.
pub async fn expect_closed(client: &mut TcpStream) {
    let mut buf = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut buf))
        .await
        .expect("connection was not closed");
    if let Ok(n) = result {
        assert_eq!(n, 0, "unexpected data before close");
    }
}

pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
