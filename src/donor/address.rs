//! Parsing of donor replica-set descriptors.
//!
//! The only accepted form is `setName/host:port[,host:port...]`. Anything
//! else fails before any directory lookup or network attempt is made.

use std::fmt;

use thiserror::Error;

/// Why a donor address failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("missing replica set name in {0:?}")]
    MissingSetName(String),
    #[error("empty replica set name in {0:?}")]
    EmptySetName(String),
    #[error("no hosts in {0:?}")]
    NoHosts(String),
    #[error("invalid host:port pair {0:?}")]
    InvalidHostPort(String),
}

/// One `host:port` member address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A parsed replica-set descriptor: set name plus seed host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSetAddress {
    pub set_name: String,
    pub hosts: Vec<HostPort>,
}

impl ReplicaSetAddress {
    /// Parse a `setName/host:port,...` descriptor.
    pub fn parse(input: &str) -> Result<Self, AddressParseError> {
        let (set_name, host_list) = input
            .split_once('/')
            .ok_or_else(|| AddressParseError::MissingSetName(input.to_string()))?;
        if set_name.is_empty() || set_name.contains([',', ' ']) {
            return Err(AddressParseError::EmptySetName(input.to_string()));
        }
        if host_list.is_empty() {
            return Err(AddressParseError::NoHosts(input.to_string()));
        }
        let mut hosts = Vec::new();
        for pair in host_list.split(',') {
            let (host, port) = pair
                .rsplit_once(':')
                .ok_or_else(|| AddressParseError::InvalidHostPort(pair.to_string()))?;
            let port: u16 = port
                .parse()
                .map_err(|_| AddressParseError::InvalidHostPort(pair.to_string()))?;
            if host.is_empty() || port == 0 || host.contains(' ') {
                return Err(AddressParseError::InvalidHostPort(pair.to_string()));
            }
            hosts.push(HostPort {
                host: host.to_string(),
                port,
            });
        }
        Ok(Self {
            set_name: set_name.to_string(),
            hosts,
        })
    }
}

impl fmt::Display for ReplicaSetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.set_name)?;
        for (i, host) in self.hosts.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{host}")?;
        }
        Ok(())
    }
}
