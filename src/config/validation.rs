//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate endpoints and value ranges (limits > 0, timeouts > 0)
//! - Detect duplicate targets
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::net::endpoint::{Endpoint, EndpointError};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid node listen endpoint: {0}")]
    ListenEndpoint(EndpointError),
    #[error("node.max_connections must be greater than 0")]
    NodeMaxConnections,
    #[error("node.timeout_secs must be greater than 0")]
    NodeTimeout,
    #[error("at least one target must be configured")]
    NoTargets,
    #[error("invalid target connect endpoint: {0}")]
    TargetEndpoint(EndpointError),
    #[error("target `{0}` is configured more than once")]
    DuplicateTarget(String),
    #[error("target `{0}`: max_connections must be greater than 0")]
    TargetMaxConnections(String),
    #[error("target `{0}`: timeout_secs must be greater than 0")]
    TargetTimeout(String),
    #[error("tls.cert_path and tls.key_path must both be set")]
    TlsPaths,
    #[error("balancing.relay_buffer_size must be greater than 0")]
    RelayBufferSize,
    #[error("balancing.connect_timeout_secs must be greater than 0")]
    ConnectTimeout,
    #[error("invalid {field} address `{value}`")]
    SocketAddress { field: &'static str, value: String },
}

/// Validate a loaded configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.node.listen.parse::<Endpoint>() {
        errors.push(ValidationError::ListenEndpoint(e));
    }
    if config.node.max_connections == 0 {
        errors.push(ValidationError::NodeMaxConnections);
    }
    if config.node.timeout_secs == 0 {
        errors.push(ValidationError::NodeTimeout);
    }

    if config.targets.is_empty() {
        errors.push(ValidationError::NoTargets);
    }
    let mut seen = HashSet::new();
    for target in &config.targets {
        match target.endpoint.parse::<Endpoint>() {
            Ok(_) => {
                if !seen.insert(target.endpoint.as_str()) {
                    errors.push(ValidationError::DuplicateTarget(target.endpoint.clone()));
                }
            }
            Err(e) => errors.push(ValidationError::TargetEndpoint(e)),
        }
        if target.max_connections == 0 {
            errors.push(ValidationError::TargetMaxConnections(target.endpoint.clone()));
        }
        if target.timeout_secs == 0 {
            errors.push(ValidationError::TargetTimeout(target.endpoint.clone()));
        }
    }

    if config.tls.cert_path.is_empty() || config.tls.key_path.is_empty() {
        errors.push(ValidationError::TlsPaths);
    }

    if config.balancing.relay_buffer_size == 0 {
        errors.push(ValidationError::RelayBufferSize);
    }
    if config.balancing.connect_timeout_secs == 0 {
        errors.push(ValidationError::ConnectTimeout);
    }

    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "metrics", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::SocketAddress {
            field,
            value: value.to_string(),
        });
    }
}
