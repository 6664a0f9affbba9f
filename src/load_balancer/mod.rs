//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → registry.rs (snapshot of all targets)
//!     → ordering.rs (least-loaded or least-connections order)
//!     → selector.rs (skip ineligible, dial in order, fail over)
//!     → target.rs (count the established connection against its target)
//!     → Return target stream or NoTargetAvailable
//! ```
//!
//! # Design Decisions
//! - Selection works on a snapshot; stale counts are tolerated
//! - Orderings are strict weak orderings with endpoint tie-breaks
//! - Dial failures only affect the connection being set up

pub mod ordering;
pub mod registry;
pub mod selector;
pub mod target;

pub use ordering::{ordering_for, LeastConnections, LeastLoaded, TargetOrdering};
pub use registry::{TargetRegistry, TargetSnapshot};
pub use selector::{SelectError, SelectedTarget, Selection, TargetSelector};
pub use target::{Target, TargetConnectionGuard, TargetId};
