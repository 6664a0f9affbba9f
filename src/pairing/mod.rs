//! Connection pairing and traffic accounting.
//!
//! # Data Flow
//! ```text
//! Target selected
//!     → tracker.rs (NodeConnection + TargetConnection, windows start now)
//!     → registry.rs (add_pair: purge stale entries, insert both directions)
//!     → relay units increment counters on every transfer
//!     → lifecycle::scheduler resets 1m/5m/30m windows on cadence
//!     → first failing relay removes the pair and destroys both trackers
//! ```
//!
//! # Design Decisions
//! - One lock per tracker; one lock for both registry maps
//! - Lock order is always registry → tracker
//! - Snapshots are independent copies, safe to hold without locks

pub mod registry;
pub mod tracker;
pub mod window;

pub use registry::{ConnectionPair, PairRegistry, PairSnapshot};
pub use tracker::{ConnectionSnapshot, NodeConnection, TargetConnection, TrackedConnection};
pub use window::{Window, WindowCounters};
