//! TLS client configuration, certificate loading and target dialing.
//!
//! # Trust model
//! Every outbound handshake presents the configured client certificate, but
//! the target's certificate chain is NOT validated: targets are operator
//! configured and trust decisions are made above this proxy. Handshake
//! signatures are still checked, so the peer must hold the key for the
//! certificate it presents. This is an explicit security trade-off.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::TlsConfig;
use crate::net::dialer::{DialError, Dialer};
use crate::net::endpoint::Endpoint;

/// Error type for loading TLS material. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Load the client certificate chain from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: display.clone(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: display.clone(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(display));
    }
    Ok(certs)
}

/// Load the client private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: display.clone(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io {
            path: display.clone(),
            source,
        })?
        .ok_or(TlsError::NoPrivateKey(display))
}

/// Build the client configuration used for every target handshake.
pub fn client_config(cert_path: &Path, key_path: &Path) -> Result<ClientConfig, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
        .with_client_auth_cert(certs, key)?;

    Ok(config)
}

/// Accepts any server certificate chain; see the module docs.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
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

/// Dials targets over TLS.
#[derive(Clone)]
pub struct TlsDialer {
    connector: TlsConnector,
    connect_timeout: Duration,
}

impl TlsDialer {
    pub fn new(config: ClientConfig, connect_timeout: Duration) -> Self {
        Self {
            connector: TlsConnector::from(Arc::new(config)),
            connect_timeout,
        }
    }

    /// Load the configured certificate material and build a dialer.
    pub fn from_config(tls: &TlsConfig, connect_timeout: Duration) -> Result<Self, TlsError> {
        let config = client_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))?;
        tracing::info!(cert_path = %tls.cert_path, "TLS client certificate loaded");
        Ok(Self::new(config, connect_timeout))
    }
}

impl Dialer for TlsDialer {
    type Stream = TlsStream<TcpStream>;

    async fn dial(&self, endpoint: &str) -> Result<Self::Stream, DialError> {
        let parsed: Endpoint = endpoint.parse()?;
        let server_name = ServerName::try_from(parsed.host().to_string())
            .map_err(|_| DialError::ServerName(parsed.host().to_string()))?;

        let connect = async {
            let tcp = TcpStream::connect(endpoint).await.map_err(DialError::Connect)?;
            if let Err(e) = tcp.set_nodelay(true) {
                tracing::debug!(endpoint = %endpoint, error = %e, "Failed to set TCP_NODELAY");
            }
            self.connector
                .connect(server_name, tcp)
                .await
                .map_err(DialError::Handshake)
        };

        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| DialError::Timeout(self.connect_timeout))??;

        log_session(endpoint, &stream);
        Ok(stream)
    }
}

fn log_session(endpoint: &str, stream: &TlsStream<TcpStream>) {
    let (_, session) = stream.get_ref();
    for cert in session.peer_certificates().unwrap_or_default() {
        tracing::debug!(
            endpoint = %endpoint,
            fingerprint = %hex::encode(Sha256::digest(cert.as_ref())),
            "Target certificate"
        );
    }
    tracing::info!(
        endpoint = %endpoint,
        handshake_complete = !session.is_handshaking(),
        protocol = ?session.protocol_version(),
        "TLS session established"
    );
}
