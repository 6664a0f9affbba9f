//! Node-facing proxy.
//!
//! # Data Flow
//! ```text
//! net::Listener (admission slot)
//!     → server.rs (select target, register pair)
//!     → relay.rs ×2 (node → target, target → node)
//!     → first relay to stop tears the pair down
//! ```

pub mod relay;
pub mod server;

pub use relay::{relay, Direction, RelayExit, RelayOutcome};
pub use server::{ProxyServer, RelaySettings};
