//! One direction of a proxied pair.
//!
//! # Responsibilities
//! - Copy bytes from one leg to the other, one full write per read
//! - Apply the source leg's idle timeout to every read
//! - Account each transfer on both trackers
//! - Tear the pair down exactly once when either direction ends
//!
//! # Teardown
//! ```text
//! EOF / read error / write error / idle timeout
//!     → remove pair from registry using this direction's own key
//!         Some(pair) → destroy both trackers (wakes the sibling)
//!         None       → sibling already tore down; nothing left to do
//!     → shut down our write half, drop our halves
//! ```
//! The sibling direction is blocked in a read or write; destroying the
//! trackers resolves its `closed()` wait and it unwinds the same way.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::connection::ConnectionState;
use crate::observability::metrics;
use crate::pairing::{ConnectionPair, PairRegistry, TrackedConnection};

/// Bound on flushing a close to the peer once a direction has ended.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Which way bytes flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client → target.
    NodeToTarget,
    /// Target → client.
    TargetToNode,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::NodeToTarget => "node_to_target",
            Direction::TargetToNode => "target_to_node",
        }
    }

    /// Supervisor task name for this direction.
    pub fn task_name(self) -> &'static str {
        match self {
            Direction::NodeToTarget => "tcp_node_data",
            Direction::TargetToNode => "tcp_target_data",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a relay direction stopped.
#[derive(Debug)]
pub enum RelayExit {
    /// Source closed its side.
    Eof,
    /// No data from the source within its timeout.
    IdleTimeout,
    ReadError(std::io::Error),
    WriteError(std::io::Error),
    /// The pair was torn down by the other direction.
    PairClosed,
}

impl RelayExit {
    pub fn reason(&self) -> &'static str {
        match self {
            RelayExit::Eof => "eof",
            RelayExit::IdleTimeout => "idle_timeout",
            RelayExit::ReadError(_) => "read_error",
            RelayExit::WriteError(_) => "write_error",
            RelayExit::PairClosed => "pair_closed",
        }
    }
}

impl fmt::Display for RelayExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayExit::ReadError(e) | RelayExit::WriteError(e) => write!(f, "{}: {}", self.reason(), e),
            _ => f.write_str(self.reason()),
        }
    }
}

/// Result of one finished relay direction.
#[derive(Debug)]
pub struct RelayOutcome {
    pub direction: Direction,
    pub exit: RelayExit,
    /// Bytes moved by this direction.
    pub bytes: u64,
    /// Whether this direction performed the pair teardown.
    pub tore_down: bool,
}

enum ReadFailure {
    Idle,
    Io(std::io::Error),
}

async fn read_with_deadline<R>(reader: &mut R, buf: &mut [u8], idle: Duration) -> Result<usize, ReadFailure>
where
    R: AsyncRead + Unpin,
{
    if idle.is_zero() {
        return reader.read(buf).await.map_err(ReadFailure::Io);
    }
    match tokio::time::timeout(idle, reader.read(buf)).await {
        Ok(result) => result.map_err(ReadFailure::Io),
        Err(_) => Err(ReadFailure::Idle),
    }
}

/// Relay `reader` → `writer` for one direction of `pair` until it ends.
pub async fn relay<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    pair: ConnectionPair,
    registry: Arc<PairRegistry>,
    buffer_size: usize,
) -> RelayOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (source, dest): (&TrackedConnection, &TrackedConnection) = match direction {
        Direction::NodeToTarget => (&**pair.node, &**pair.target),
        Direction::TargetToNode => (&**pair.target, &**pair.node),
    };

    let mut buf = vec![0u8; buffer_size];
    let mut bytes = 0u64;

    let exit = loop {
        let idle = source.timeout();
        let read = tokio::select! {
            biased;
            _ = source.closed() => break RelayExit::PairClosed,
            _ = dest.closed() => break RelayExit::PairClosed,
            result = read_with_deadline(&mut reader, &mut buf, idle) => result,
        };
        let n = match read {
            Ok(0) => break RelayExit::Eof,
            Ok(n) => n,
            Err(ReadFailure::Idle) => break RelayExit::IdleTimeout,
            Err(ReadFailure::Io(e)) => break RelayExit::ReadError(e),
        };

        let written = tokio::select! {
            biased;
            _ = dest.closed() => break RelayExit::PairClosed,
            result = async {
                writer.write_all(&buf[..n]).await?;
                writer.flush().await
            } => result,
        };
        if let Err(e) = written {
            break RelayExit::WriteError(e);
        }

        let n = n as u64;
        source.increment_read(n);
        dest.increment_write(n);
        bytes += n;
        metrics::record_relay_bytes(direction.label(), n);
    };

    let tore_down = teardown(direction, &pair, &registry, &exit, bytes);
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown()).await;

    RelayOutcome {
        direction,
        exit,
        bytes,
        tore_down,
    }
}

/// Remove the pair via this direction's key; the caller that gets it destroys both legs.
fn teardown(
    direction: Direction,
    pair: &ConnectionPair,
    registry: &PairRegistry,
    exit: &RelayExit,
    bytes: u64,
) -> bool {
    let removed = match direction {
        Direction::NodeToTarget => registry.remove_by_node(&pair.node),
        Direction::TargetToNode => registry.remove_by_target(&pair.target),
    };

    match removed {
        Some(removed) => {
            removed.node.destroy();
            removed.target.destroy();
            tracing::info!(
                node_conn = %removed.node.id(),
                target_conn = %removed.target.id(),
                target_id = %removed.target.target_id(),
                direction = %direction,
                bytes,
                reason = %exit,
                state = %ConnectionState::Closed,
                "Pair closed"
            );
            metrics::record_pair_closed(exit.reason());
            metrics::set_active_pairs(registry.count_pairs());
            true
        }
        None => {
            // Destroy is idempotent; this only matters if our legs were never registered.
            pair.node.destroy();
            pair.target.destroy();
            tracing::debug!(
                node_conn = %pair.node.id(),
                direction = %direction,
                bytes,
                reason = %exit,
                "Relay direction finished after pair teardown"
            );
            false
        }
    }
}
