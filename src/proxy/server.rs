//! Accept loop and per-connection pairing.
//!
//! # Connection Lifecycle
//! ```text
//! Accepted (admission slot held)
//!     → Selecting: TargetSelector dials candidates in order
//!         NoTargetAvailable → Failed: close node socket, release slot
//!     → Paired: trackers created, pair registered
//!     → Relaying: two supervised relay units
//!     → Closed: first unit to stop tears the pair down;
//!               slot and target count released when both units are gone
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::lifecycle::TaskSupervisor;
use crate::load_balancer::{Selection, TargetConnectionGuard, TargetSelector};
use crate::net::connection::ConnectionState;
use crate::net::dialer::Dialer;
use crate::net::listener::{AdmissionPermit, Listener, ListenerError};
use crate::observability::metrics;
use crate::pairing::{ConnectionPair, NodeConnection, PairRegistry, TargetConnection};
use crate::proxy::relay::{relay, Direction};

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Per-connection settings shared by every pair.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Idle timeout applied to node connections.
    pub node_timeout: Duration,
    /// Read buffer size per relay direction.
    pub buffer_size: usize,
}

/// Resources a pair holds until both relay directions have exited.
#[derive(Debug)]
struct PairLease {
    _admission: AdmissionPermit,
    _target: TargetConnectionGuard,
}

struct ProxyContext<D: Dialer> {
    selector: TargetSelector<D>,
    pairs: Arc<PairRegistry>,
    supervisor: TaskSupervisor,
    settings: RelaySettings,
}

/// The balancer's node-facing server.
pub struct ProxyServer<D: Dialer> {
    ctx: Arc<ProxyContext<D>>,
}

impl<D: Dialer> Clone for ProxyServer<D> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<D: Dialer> ProxyServer<D> {
    pub fn new(
        selector: TargetSelector<D>,
        pairs: Arc<PairRegistry>,
        supervisor: TaskSupervisor,
        settings: RelaySettings,
    ) -> Self {
        Self {
            ctx: Arc::new(ProxyContext {
                selector,
                pairs,
                supervisor,
                settings,
            }),
        }
    }

    pub fn pairs(&self) -> &Arc<PairRegistry> {
        &self.ctx.pairs
    }

    /// Accept node connections until shutdown is signalled.
    ///
    /// Established pairs keep relaying after this returns.
    pub async fn run(&self, listener: Listener, mut shutdown: broadcast::Receiver<()>) -> Result<(), ListenerError> {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let ctx = Arc::clone(&self.ctx);
                        self.ctx.supervisor.spawn("tcp_proxy_conn", async move {
                            ctx.handle_connection(stream, peer_addr, permit).await;
                        });
                    }
                    Err(ListenerError::GateClosed) => return Err(ListenerError::GateClosed),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(
                        active_pairs = self.ctx.pairs.count_pairs(),
                        "Stopped accepting node connections"
                    );
                    return Ok(());
                }
            }
        }
    }
}

impl<D: Dialer> ProxyContext<D> {
    async fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr, permit: AdmissionPermit) {
        tracing::debug!(peer_addr = %peer_addr, state = %ConnectionState::Selecting, "Selecting target");

        let Selection { stream: target_stream, target } = match self.selector.select().await {
            Ok(selection) => selection,
            Err(e) => {
                tracing::warn!(
                    peer_addr = %peer_addr,
                    state = %ConnectionState::Failed,
                    error = %e,
                    "Can not connect to any target, closing node connection"
                );
                metrics::record_no_target();
                drop(stream);
                drop(permit);
                return;
            }
        };

        let node = Arc::new(NodeConnection::new(peer_addr, self.settings.node_timeout));
        let target_conn = Arc::new(TargetConnection::new(&target.endpoint, target.timeout, target.id.clone()));
        let pair = ConnectionPair::new(Arc::clone(&node), Arc::clone(&target_conn));
        if !self.pairs.add_pair(node, target_conn) {
            tracing::warn!(peer_addr = %peer_addr, "Pair torn down before registration");
            return;
        }

        metrics::record_pair_opened(&target.id);
        metrics::set_active_pairs(self.pairs.count_pairs());
        tracing::info!(
            peer_addr = %peer_addr,
            node_conn = %pair.node.id(),
            target_conn = %pair.target.id(),
            target_id = %target.id,
            endpoint = %target.endpoint,
            state = %ConnectionState::Paired,
            "Pair established"
        );

        let lease = Arc::new(PairLease {
            _admission: permit,
            _target: target.guard,
        });

        let (node_read, node_write) = stream.into_split();
        let (target_read, target_write) = tokio::io::split(target_stream);
        let buffer_size = self.settings.buffer_size;

        {
            let (pair, pairs, lease) = (pair.clone(), Arc::clone(&self.pairs), Arc::clone(&lease));
            let direction = Direction::NodeToTarget;
            self.supervisor.spawn(direction.task_name(), async move {
                let _lease = lease;
                relay(direction, node_read, target_write, pair, pairs, buffer_size).await
            });
        }
        {
            let pairs = Arc::clone(&self.pairs);
            let direction = Direction::TargetToNode;
            self.supervisor.spawn(direction.task_name(), async move {
                let _lease = lease;
                relay(direction, target_read, node_write, pair, pairs, buffer_size).await
            });
        }
        tracing::debug!(peer_addr = %peer_addr, state = %ConnectionState::Relaying, "Relays started");
    }
}
