//! Connection pair registry.
//!
//! # Responsibilities
//! - Associate each node connection with exactly one target connection
//! - Remove a pair atomically from either side
//! - Enumerate and aggregate pairs for monitoring and window resets
//!
//! # Design Decisions
//! - Two mutually inverse maps behind ONE lock, so both directions change together
//! - Keys are per-instance `ConnectionId`s, not connection values
//! - Removal hands the pair to exactly one caller; racing callers get `None`
//! - Read methods return fresh maps, never views into the registry

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::load_balancer::TargetId;
use crate::net::connection::ConnectionId;
use crate::pairing::tracker::{ConnectionSnapshot, NodeConnection, TargetConnection};
use crate::pairing::window::Window;

/// One node connection and the target connection it is relayed to.
#[derive(Debug, Clone)]
pub struct ConnectionPair {
    pub node: Arc<NodeConnection>,
    pub target: Arc<TargetConnection>,
}

impl ConnectionPair {
    pub fn new(node: Arc<NodeConnection>, target: Arc<TargetConnection>) -> Self {
        Self { node, target }
    }

    pub fn snapshot(&self) -> PairSnapshot {
        PairSnapshot {
            node: self.node.snapshot(),
            target: self.target.snapshot(),
        }
    }
}

/// Snapshots of both legs of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairSnapshot {
    pub node: ConnectionSnapshot,
    pub target: ConnectionSnapshot,
}

#[derive(Debug, Default)]
struct PairMaps {
    node_to_target: HashMap<ConnectionId, Arc<TargetConnection>>,
    target_to_node: HashMap<ConnectionId, Arc<NodeConnection>>,
}

impl PairMaps {
    /// Drop `node` and its partner from both maps.
    fn unlink_node(&mut self, node: ConnectionId) -> Option<Arc<TargetConnection>> {
        let target = self.node_to_target.remove(&node)?;
        self.target_to_node.remove(&target.id());
        Some(target)
    }

    /// Drop `target` and its partner from both maps.
    fn unlink_target(&mut self, target: ConnectionId) -> Option<Arc<NodeConnection>> {
        let node = self.target_to_node.remove(&target)?;
        self.node_to_target.remove(&node.id());
        Some(node)
    }

    fn pairs(&self) -> impl Iterator<Item = ConnectionPair> + '_ {
        self.target_to_node.values().filter_map(|node| {
            self.node_to_target
                .get(&node.id())
                .map(|target| ConnectionPair::new(node.clone(), target.clone()))
        })
    }
}

/// Process-wide registry of live pairs.
#[derive(Debug, Default)]
pub struct PairRegistry {
    maps: RwLock<PairMaps>,
}

impl PairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves both maps consistent (every
    // mutation is a few map operations), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, PairMaps> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PairMaps> {
        self.maps.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pair, first purging any pair either side belonged to.
    ///
    /// Returns `false` without registering if either tracker was already
    /// destroyed.
    pub fn add_pair(&self, node: Arc<NodeConnection>, target: Arc<TargetConnection>) -> bool {
        if node.is_destroyed() || target.is_destroyed() {
            return false;
        }

        let mut maps = self.write();
        maps.unlink_node(node.id());
        maps.unlink_target(target.id());
        maps.node_to_target.insert(node.id(), target.clone());
        maps.target_to_node.insert(target.id(), node);
        true
    }

    /// Remove the pair `node` belongs to. `None` if it is not registered.
    pub fn remove_by_node(&self, node: &NodeConnection) -> Option<ConnectionPair> {
        let mut maps = self.write();
        let target = maps.node_to_target.get(&node.id())?.clone();
        let node = maps.target_to_node.get(&target.id())?.clone();
        maps.unlink_node(node.id());
        Some(ConnectionPair::new(node, target))
    }

    /// Remove the pair `target` belongs to. `None` if it is not registered.
    pub fn remove_by_target(&self, target: &TargetConnection) -> Option<ConnectionPair> {
        let mut maps = self.write();
        let node = maps.target_to_node.get(&target.id())?.clone();
        let target = maps.node_to_target.get(&node.id())?.clone();
        maps.unlink_target(target.id());
        Some(ConnectionPair::new(node, target))
    }

    /// Number of registered pairs.
    pub fn count_pairs(&self) -> usize {
        self.read().target_to_node.len()
    }

    /// Number of pairs whose target leg is attached to `target_id`.
    pub fn count_by_target_id(&self, target_id: &TargetId) -> usize {
        self.read()
            .node_to_target
            .values()
            .filter(|t| t.target_id() == target_id)
            .count()
    }

    /// Pairs attached to `target_id`, keyed by target connection id.
    pub fn pairs_by_target_id(&self, target_id: &TargetId) -> HashMap<ConnectionId, ConnectionPair> {
        self.read()
            .pairs()
            .filter(|p| p.target.target_id() == target_id)
            .map(|p| (p.target.id(), p))
            .collect()
    }

    /// Every pair, keyed by target connection id.
    pub fn all_pairs(&self) -> HashMap<ConnectionId, ConnectionPair> {
        self.read().pairs().map(|p| (p.target.id(), p)).collect()
    }

    /// Snapshots of every pair, ordered by target connection id.
    pub fn snapshots(&self) -> Vec<PairSnapshot> {
        let mut pairs: Vec<_> = self.all_pairs().into_values().collect();
        pairs.sort_by_key(|p| p.target.id());
        pairs.iter().map(ConnectionPair::snapshot).collect()
    }

    /// Reset `window` on both legs of every pair.
    pub fn reset_all_windows(&self, window: Window) {
        let maps = self.read();
        for pair in maps.pairs() {
            pair.node.reset_window(window);
            pair.target.reset_window(window);
        }
    }
}
