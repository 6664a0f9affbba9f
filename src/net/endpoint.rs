//! `host:port` endpoint strings.
//!
//! Endpoints are kept as strings in configuration and resolved lazily at
//! dial time, so hostnames are allowed alongside IP literals. IPv6 literals
//! must be bracketed (`[::1]:443`).

use std::fmt;
use std::str::FromStr;

/// Error type for endpoint parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("endpoint `{0}` is missing a port")]
    MissingPort(String),
    #[error("endpoint `{0}` has an empty host")]
    EmptyHost(String),
    #[error("endpoint `{0}` has an invalid port")]
    InvalidPort(String),
    #[error("endpoint `{0}` has an unterminated IPv6 literal")]
    UnterminatedBracket(String),
}

/// A parsed `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Host part, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| EndpointError::UnterminatedBracket(s.to_string()))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| EndpointError::MissingPort(s.to_string()))?;
            (host, port)
        } else {
            let (host, port) = s
                .rsplit_once(':')
                .ok_or_else(|| EndpointError::MissingPort(s.to_string()))?;
            // An unbracketed colon in the host means an IPv6 literal without brackets.
            if host.contains(':') {
                return Err(EndpointError::UnterminatedBracket(s.to_string()));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(EndpointError::EmptyHost(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(s.to_string()))?;
        if port == 0 {
            return Err(EndpointError::InvalidPort(s.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
