//! Target registry.
//!
//! # Responsibilities
//! - Own the configured targets for the process lifetime
//! - Provide point-in-time snapshots for selection and monitoring
//! - Look targets up by id

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::TargetConfig;
use crate::load_balancer::target::{Target, TargetId};

/// Copy of a target's state at one instant.
///
/// Live counts may change as soon as the snapshot is taken; consumers must
/// tolerate the staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub endpoint: String,
    pub active: bool,
    pub max_connections: usize,
    pub current_connections: usize,
    pub timeout_secs: u64,
}

impl TargetSnapshot {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Active and below its connection ceiling.
    pub fn is_eligible(&self) -> bool {
        self.active && self.current_connections < self.max_connections
    }
}

/// All configured targets. The set is fixed at startup.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: Vec<Arc<Target>>,
    by_id: HashMap<TargetId, Arc<Target>>,
}

impl TargetRegistry {
    pub fn new(targets: Vec<Target>) -> Self {
        let targets: Vec<Arc<Target>> = targets.into_iter().map(Arc::new).collect();
        let by_id = targets.iter().map(|t| (t.id.clone(), t.clone())).collect();
        Self { targets, by_id }
    }

    pub fn from_config(configs: &[TargetConfig]) -> Self {
        let registry = Self::new(configs.iter().map(Target::from_config).collect());
        for target in &registry.targets {
            tracing::info!(
                target_id = %target.id,
                endpoint = %target.endpoint,
                active = target.active,
                max_connections = target.max_connections,
                "Target registered"
            );
        }
        registry
    }

    /// Snapshot every target. Order is not meaningful.
    pub fn snapshot(&self) -> Vec<TargetSnapshot> {
        self.targets
            .iter()
            .map(|t| TargetSnapshot {
                id: t.id.clone(),
                endpoint: t.endpoint.clone(),
                active: t.active,
                max_connections: t.max_connections,
                current_connections: t.connection_count(),
                timeout_secs: t.timeout.as_secs(),
            })
            .collect()
    }

    pub fn get(&self, id: &TargetId) -> Option<Arc<Target>> {
        self.by_id.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_live_counts() {
        let registry = TargetRegistry::from_config(&[
            TargetConfig::new("10.0.0.1:443"),
            TargetConfig {
                active: false,
                ..TargetConfig::new("10.0.0.2:443")
            },
        ]);
        assert_eq!(registry.len(), 2);

        let id = TargetId::from_endpoint("10.0.0.1:443");
        let target = registry.get(&id).unwrap();
        let _guard = target.track_connection();

        let snapshot = registry.snapshot();
        let first = snapshot.iter().find(|s| s.id == id).unwrap();
        assert_eq!(first.current_connections, 1);
        assert!(first.is_eligible());

        let second = snapshot.iter().find(|s| s.id != id).unwrap();
        assert!(!second.is_eligible());
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let registry = TargetRegistry::from_config(&[TargetConfig::new("10.0.0.1:443")]);
        let before = registry.snapshot();

        let target = registry.get(&before[0].id).unwrap();
        let _guard = target.track_connection();

        assert_eq!(before[0].current_connections, 0);
        assert_eq!(registry.snapshot()[0].current_connections, 1);
    }
}
