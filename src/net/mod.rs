//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (admission gate, accept, keep-alive)
//!     → connection.rs (connection ids, lifecycle states)
//!     → hand off to proxy::server
//!
//! Outbound target connection
//!     → endpoint.rs (host:port parsing)
//!     → dialer.rs (Dialer seam)
//!     → tls.rs (TCP connect + TLS handshake with client certificate)
//! ```
//!
//! # Design Decisions
//! - Admission is a hard cap: a slot is acquired before `accept`
//! - TLS material is loaded once at startup; failures there are fatal
//! - Dial attempts are bounded by the configured connect timeout

pub mod connection;
pub mod dialer;
pub mod endpoint;
pub mod listener;
pub mod tls;
