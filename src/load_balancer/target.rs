//! Target abstraction.
//!
//! # Responsibilities
//! - Represent a single configured backend target
//! - Derive its stable target id from the endpoint string
//! - Track live connections routed to it

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::TargetConfig;

/// Stable identifier of a target, derived from its endpoint string.
///
/// The first 8 bytes of the endpoint's SHA-256, hex encoded. The same
/// endpoint always yields the same id, without any lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn from_endpoint(endpoint: &str) -> Self {
        let digest = Sha256::digest(endpoint.as_bytes());
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    /// Wrap an already-derived id (e.g. from an admin URL path).
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A single configured target.
#[derive(Debug)]
pub struct Target {
    /// Stable id derived from `endpoint`.
    pub id: TargetId,
    /// `host:port` dialed for this target.
    pub endpoint: String,
    /// Inactive targets are never selected.
    pub active: bool,
    /// Maximum concurrent connections allowed.
    pub max_connections: usize,
    /// Idle read timeout applied to connections to this target.
    pub timeout: Duration,
    /// Number of currently live connections.
    active_connections: AtomicUsize,
}

impl Target {
    pub fn new(endpoint: impl Into<String>, active: bool, max_connections: usize, timeout: Duration) -> Self {
        let endpoint = endpoint.into();
        Self {
            id: TargetId::from_endpoint(&endpoint),
            endpoint,
            active,
            max_connections,
            timeout,
            active_connections: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.active,
            config.max_connections,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Get the current number of live connections.
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Count a new live connection until the returned guard is dropped.
    ///
    /// Unconditional: eligibility was decided on a snapshot, and a connection
    /// that is already established is always counted.
    pub fn track_connection(self: &Arc<Self>) -> TargetConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        TargetConnectionGuard {
            target: self.clone(),
        }
    }
}

/// A RAII guard that manages the live connection count.
#[derive(Debug)]
pub struct TargetConnectionGuard {
    target: Arc<Target>,
}

impl Deref for TargetConnectionGuard {
    type Target = Target;
    fn deref(&self) -> &Self::Target {
        &self.target
    }
}

impl Drop for TargetConnectionGuard {
    fn drop(&mut self) {
        self.target.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
