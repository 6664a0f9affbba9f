//! TLS load-balancing TCP proxy library.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod pairing;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use lifecycle::{Application, Shutdown};
pub use proxy::ProxyServer;
