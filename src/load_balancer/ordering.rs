//! Target ordering policies.
//!
//! Each policy is a strict weak ordering over snapshots. Ties always fall
//! back to the endpoint string so two runs over the same snapshot try targets
//! in the same order.

use std::cmp::Ordering;

use crate::config::BalancingStrategy;
use crate::load_balancer::registry::TargetSnapshot;

/// Orders targets before selection; earlier targets are tried first.
pub trait TargetOrdering: Send + Sync + std::fmt::Debug {
    fn compare(&self, a: &TargetSnapshot, b: &TargetSnapshot) -> Ordering;

    /// Sort a snapshot in place.
    fn sort(&self, targets: &mut [TargetSnapshot]) {
        targets.sort_by(|a, b| self.compare(a, b));
    }
}

/// Least loaded first: lowest `current / max` ratio.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl TargetOrdering for LeastLoaded {
    fn compare(&self, a: &TargetSnapshot, b: &TargetSnapshot) -> Ordering {
        load_ratio_cmp(a, b).then_with(|| a.endpoint.cmp(&b.endpoint))
    }
}

/// Compare `a.current / a.max` with `b.current / b.max` without floats.
/// A zero ceiling counts as fully loaded.
fn load_ratio_cmp(a: &TargetSnapshot, b: &TargetSnapshot) -> Ordering {
    match (a.max_connections == 0, b.max_connections == 0) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let lhs = a.current_connections as u128 * b.max_connections as u128;
            let rhs = b.current_connections as u128 * a.max_connections as u128;
            lhs.cmp(&rhs)
        }
    }
}

/// Least connections first: lowest absolute count.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastConnections;

impl TargetOrdering for LeastConnections {
    fn compare(&self, a: &TargetSnapshot, b: &TargetSnapshot) -> Ordering {
        a.current_connections
            .cmp(&b.current_connections)
            .then_with(|| a.endpoint.cmp(&b.endpoint))
    }
}

/// Build the ordering configured by `strategy`.
pub fn ordering_for(strategy: BalancingStrategy) -> Box<dyn TargetOrdering> {
    match strategy {
        BalancingStrategy::LeastLoaded => Box::new(LeastLoaded),
        BalancingStrategy::LeastConnections => Box::new(LeastConnections),
    }
}
