//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → TLS material → registries → listeners
//!
//! Running:
//!     supervisor.rs counts accept, per-connection and relay units
//!     scheduler.rs resets traffic windows on cadence
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → stop accepting → drain pairs → force close → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: TLS first, listeners last (traffic only when ready)
//! - Any startup error is fatal
//! - Shutdown has a deadline: remaining pairs are destroyed after it

pub mod scheduler;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use scheduler::WindowResetScheduler;
pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{Application, StartupError};
pub use supervisor::{TaskGuard, TaskSupervisor};
