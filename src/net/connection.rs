//! Connection identity and lifecycle states.
//!
//! # Responsibilities
//! - Generate unique connection IDs, used as registry keys and in logs
//! - Name the per-connection states the orchestrator moves through

use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one live connection instance.
///
/// Node-side and target-side connections draw from the same counter, so an id
/// never refers to more than one connection during the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Per-connection state, from accept to teardown.
///
/// ```text
/// Accepted → Selecting → Paired → Relaying → Closed
///                │
///                └──────→ Failed (no target available)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted from the listener, admission slot held.
    Accepted,
    /// Trying targets in order.
    Selecting,
    /// Target connection established and registered.
    Paired,
    /// Both relay directions running.
    Relaying,
    /// Torn down after relaying.
    Closed,
    /// No target could be reached; client connection dropped.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::Selecting => "selecting",
            ConnectionState::Paired => "paired",
            ConnectionState::Relaying => "relaying",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}
