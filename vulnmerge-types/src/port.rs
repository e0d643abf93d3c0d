use serde::{Deserialize, Serialize};
use std::fmt;

/// A listening socket of an affected process, parsed from `addr:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStat {
    /// Bind address without IPv6 brackets; "*" for any.
    pub bind_address: String,
    /// Port number, or "*" when the scanner could not tell.
    pub port: String,
    /// Addresses from which the port was found reachable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reachable_by: Vec<String>,
}

impl PortStat {
    /// Parse a raw listen string such as `127.0.0.1:22`, `[::1]:80` or `*:443`.
    pub fn parse(input: &str) -> Result<Self, PortStatParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PortStatParseError::Empty);
        }
        let (addr, port) = input
            .rsplit_once(':')
            .ok_or_else(|| PortStatParseError::MissingPort(input.to_string()))?;

        if port != "*" && port.parse::<u16>().is_err() {
            return Err(PortStatParseError::InvalidPort(port.to_string()));
        }

        let addr = addr
            .strip_prefix('[')
            .and_then(|a| a.strip_suffix(']'))
            .unwrap_or(addr);
        if addr.is_empty() {
            return Err(PortStatParseError::MissingAddress(input.to_string()));
        }

        Ok(Self {
            bind_address: addr.to_string(),
            port: port.to_string(),
            reachable_by: Vec::new(),
        })
    }
}

impl fmt::Display for PortStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bind_address.contains(':') {
            write!(f, "[{}]:{}", self.bind_address, self.port)
        } else {
            write!(f, "{}:{}", self.bind_address, self.port)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortStatParseError {
    #[error("empty listen address")]
    Empty,
    #[error("missing port in listen address: {0}")]
    MissingPort(String),
    #[error("missing bind address in listen address: {0}")]
    MissingAddress(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
}
