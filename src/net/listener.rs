//! TCP listener with admission control.
//!
//! # Responsibilities
//! - Bind to the configured node endpoint
//! - Accept incoming TCP connections and enable keep-alive
//! - Enforce the node `max_connections` ceiling via the accept gate
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::NodeConfig;
use crate::net::connection::ConnectionState;
use crate::observability::metrics;

const KEEPALIVE_TIME: Duration = Duration::from_secs(60);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(std::io::Error),
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),
    /// The accept gate was closed.
    #[error("Accept gate closed")]
    GateClosed,
}

/// Admission control for client connections.
///
/// A slot is taken before a socket is accepted and given back when the
/// returned [`AdmissionPermit`] is dropped, so the ceiling is a hard cap.
#[derive(Debug, Clone)]
pub struct AcceptGate {
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl AcceptGate {
    pub fn new(max_connections: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> Result<AdmissionPermit, ListenerError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::GateClosed)?;
        Ok(self.permit(permit))
    }

    /// Take a free slot without waiting.
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        let permit = self.slots.clone().try_acquire_owned().ok()?;
        Some(self.permit(permit))
    }

    fn permit(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        metrics::set_admitted_connections(self.in_flight());
        AdmissionPermit {
            permit: Some(permit),
            gate: self.clone(),
        }
    }

    /// Connections currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_connections - self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A held admission slot.
///
/// When dropped, the slot is released back to the gate. This keeps the count
/// correct even if the connection handler panics.
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: Option<OwnedSemaphorePermit>,
    gate: AcceptGate,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        metrics::set_admitted_connections(self.gate.in_flight());
    }
}

/// The node-side listening socket.
pub struct Listener {
    inner: TcpListener,
    gate: AcceptGate,
}

impl Listener {
    /// Bind to the configured node endpoint.
    pub async fn bind(config: &NodeConfig) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(config.listen.as_str())
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Node listener bound"
        );

        Ok(Self {
            inner: listener,
            gate: AcceptGate::new(config.max_connections),
        })
    }

    /// Accept a new connection, respecting the admission ceiling.
    ///
    /// This will wait if the ceiling has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, AdmissionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self.gate.admit().await?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        enable_keepalive(&stream, addr);
        metrics::record_connection_accepted();

        tracing::debug!(
            peer_addr = %addr,
            in_flight = self.gate.in_flight(),
            state = %ConnectionState::Accepted,
            "Connection accepted"
        );

        Ok((stream, addr, permit))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// The admission gate guarding this listener.
    pub fn gate(&self) -> &AcceptGate {
        &self.gate
    }
}

fn enable_keepalive(stream: &TcpStream, peer_addr: SocketAddr) {
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        tracing::debug!(peer_addr = %peer_addr, error = %e, "Failed to enable keep-alive");
    }
}
