//! Outbound connection establishment seam.
//!
//! The target selector only needs "give me an established stream to this
//! endpoint, or an error". [`crate::net::tls::TlsDialer`] is the production
//! implementation; tests substitute in-memory dialers.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::net::endpoint::EndpointError;

/// Error type for a single dial attempt.
#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("invalid TLS server name `{0}`")]
    ServerName(String),
    #[error("connect failed: {0}")]
    Connect(std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
}

/// Establishes outbound connections to targets.
pub trait Dialer: Send + Sync + 'static {
    /// Stream type of an established connection.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Connect to `endpoint` and complete any handshake.
    fn dial(&self, endpoint: &str) -> impl Future<Output = Result<Self::Stream, DialError>> + Send;
}
