//! Target selection with failover.
//!
//! # Algorithm
//! ```text
//! snapshot all targets (independent copy)
//!     → sort by the configured ordering
//!     → skip inactive or saturated targets
//!     → dial each remaining target in order
//!         success → return stream + that target's metadata
//!         failure → log, try the next one
//!     → nothing left → NoTargetAvailable
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::load_balancer::ordering::TargetOrdering;
use crate::load_balancer::registry::{TargetRegistry, TargetSnapshot};
use crate::load_balancer::target::{TargetConnectionGuard, TargetId};
use crate::net::dialer::Dialer;
use crate::observability::metrics;

/// Error type for selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no target available ({eligible} eligible, {attempted} dialed)")]
    NoTargetAvailable { eligible: usize, attempted: usize },
}

/// The target a connection was established to.
#[derive(Debug)]
pub struct SelectedTarget {
    pub id: TargetId,
    pub endpoint: String,
    pub timeout: Duration,
    /// Counts this connection against the target until dropped.
    pub guard: TargetConnectionGuard,
}

/// An established target connection.
#[derive(Debug)]
pub struct Selection<S> {
    pub stream: S,
    pub target: SelectedTarget,
}

/// Chooses a target for each accepted connection.
#[derive(Debug)]
pub struct TargetSelector<D> {
    targets: Arc<TargetRegistry>,
    ordering: Box<dyn TargetOrdering>,
    dialer: D,
}

impl<D: Dialer> TargetSelector<D> {
    pub fn new(targets: Arc<TargetRegistry>, ordering: Box<dyn TargetOrdering>, dialer: D) -> Self {
        Self {
            targets,
            ordering,
            dialer,
        }
    }

    /// Eligible targets from a fresh snapshot, in the order they would be tried.
    pub fn candidates(&self) -> Vec<TargetSnapshot> {
        let mut snapshot = self.targets.snapshot();
        self.ordering.sort(&mut snapshot);
        snapshot.retain(TargetSnapshot::is_eligible);
        snapshot
    }

    /// Dial candidates in order until one succeeds.
    pub async fn select(&self) -> Result<Selection<D::Stream>, SelectError> {
        let candidates = self.candidates();
        let mut attempted = 0;

        for candidate in &candidates {
            let Some(target) = self.targets.get(&candidate.id) else {
                continue;
            };

            attempted += 1;
            match self.dialer.dial(&candidate.endpoint).await {
                Ok(stream) => {
                    tracing::debug!(
                        target_id = %candidate.id,
                        endpoint = %candidate.endpoint,
                        attempt = attempted,
                        "Target selected"
                    );
                    // Identity is bound to the target that actually answered.
                    return Ok(Selection {
                        stream,
                        target: SelectedTarget {
                            id: target.id.clone(),
                            endpoint: target.endpoint.clone(),
                            timeout: target.timeout,
                            guard: target.track_connection(),
                        },
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        target_id = %candidate.id,
                        endpoint = %candidate.endpoint,
                        error = %e,
                        "Target dial failed, trying next"
                    );
                    metrics::record_dial_failure(&candidate.endpoint);
                }
            }
        }

        Err(SelectError::NoTargetAvailable {
            eligible: candidates.len(),
            attempted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::load_balancer::ordering::LeastLoaded;
    use crate::net::dialer::DialError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::io::DuplexStream;

    /// Records dial attempts; endpoints in `reachable` succeed.
    #[derive(Debug, Default)]
    struct RecordingDialer {
        reachable: HashSet<String>,
        attempts: Mutex<Vec<String>>,
    }

    impl RecordingDialer {
        fn reaching(endpoints: &[&str]) -> Self {
            Self {
                reachable: endpoints.iter().map(|e| e.to_string()).collect(),
                attempts: Mutex::default(),
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl Dialer for Arc<RecordingDialer> {
        type Stream = DuplexStream;

        async fn dial(&self, endpoint: &str) -> Result<DuplexStream, DialError> {
            self.attempts.lock().unwrap().push(endpoint.to_string());
            if self.reachable.contains(endpoint) {
                Ok(tokio::io::duplex(64).0)
            } else {
                Err(DialError::Connect(std::io::ErrorKind::ConnectionRefused.into()))
            }
        }
    }

    fn target(endpoint: &str, active: bool, max: usize) -> TargetConfig {
        TargetConfig {
            active,
            max_connections: max,
            ..TargetConfig::new(endpoint)
        }
    }

    /// Registry where `t2` already has `cur` live connections, held by the returned guards.
    fn registry_with_load(
        configs: &[TargetConfig],
        loads: &[(&str, usize)],
    ) -> (Arc<TargetRegistry>, Vec<TargetConnectionGuard>) {
        let registry = Arc::new(TargetRegistry::from_config(configs));
        let mut guards = Vec::new();
        for (endpoint, count) in loads {
            let t = registry.get(&TargetId::from_endpoint(endpoint)).unwrap();
            guards.extend((0..*count).map(|_| t.track_connection()));
        }
        (registry, guards)
    }

    #[tokio::test]
    async fn skips_inactive_and_saturated_targets() {
        let (registry, _guards) = registry_with_load(
            &[target("t1:1", false, 5), target("t2:1", true, 5), target("t3:1", true, 5)],
            &[("t2:1", 5), ("t3:1", 1)],
        );
        let dialer = Arc::new(RecordingDialer::reaching(&["t1:1", "t2:1", "t3:1"]));
        let selector = TargetSelector::new(registry, Box::new(LeastLoaded), dialer.clone());

        let selection = selector.select().await.unwrap();
        assert_eq!(selection.target.endpoint, "t3:1");
        assert_eq!(selection.target.id, TargetId::from_endpoint("t3:1"));
        assert_eq!(dialer.attempts(), vec!["t3:1".to_string()]);
        assert_eq!(selection.target.guard.connection_count(), 2);
    }

    #[tokio::test]
    async fn fails_over_in_load_order() {
        let (registry, _guards) = registry_with_load(
            &[target("a:1", true, 10), target("b:1", true, 10), target("c:1", true, 10)],
            &[("a:1", 3), ("b:1", 1)],
        );
        let dialer = Arc::new(RecordingDialer::reaching(&["a:1"]));
        let selector = TargetSelector::new(registry, Box::new(LeastLoaded), dialer.clone());

        let selection = selector.select().await.unwrap();
        assert_eq!(selection.target.endpoint, "a:1");
        assert_eq!(dialer.attempts(), vec!["c:1", "b:1", "a:1"]);
    }

    #[tokio::test]
    async fn reports_no_target_when_all_dials_fail() {
        let (registry, _guards) =
            registry_with_load(&[target("a:1", true, 10), target("b:1", true, 10)], &[]);
        let dialer = Arc::new(RecordingDialer::default());
        let selector = TargetSelector::new(registry.clone(), Box::new(LeastLoaded), dialer.clone());

        let err = selector.select().await.unwrap_err();
        assert_eq!(err, SelectError::NoTargetAvailable { eligible: 2, attempted: 2 });
        assert!(registry.snapshot().iter().all(|t| t.current_connections == 0));
    }

    #[tokio::test]
    async fn reports_no_target_when_none_eligible() {
        let (registry, _guards) = registry_with_load(
            &[target("a:1", false, 10), target("b:1", true, 1)],
            &[("b:1", 1)],
        );
        let dialer = Arc::new(RecordingDialer::reaching(&["a:1", "b:1"]));
        let selector = TargetSelector::new(registry, Box::new(LeastLoaded), dialer.clone());

        let err = selector.select().await.unwrap_err();
        assert_eq!(err, SelectError::NoTargetAvailable { eligible: 0, attempted: 0 });
        assert!(dialer.attempts().is_empty());
    }

    #[tokio::test]
    async fn guard_released_with_selection() {
        let (registry, _guards) = registry_with_load(&[target("a:1", true, 10)], &[]);
        let dialer = Arc::new(RecordingDialer::reaching(&["a:1"]));
        let selector = TargetSelector::new(registry.clone(), Box::new(LeastLoaded), dialer);

        let selection = selector.select().await.unwrap();
        assert_eq!(registry.snapshot()[0].current_connections, 1);
        drop(selection);
        assert_eq!(registry.snapshot()[0].current_connections, 0);
    }
}
