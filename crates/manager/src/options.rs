//! Manager options and bind-address handling.

use crate::cache::CacheOptions;
use crate::error::ManagerError;
use crate::leader_election::LeaderElectionConfig;
use crate::scheme::Scheme;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Everything needed to build a [`Manager`](crate::Manager).
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Kinds the cache watches
    pub scheme: Scheme,

    /// Namespaces and resync period of the object cache
    pub cache: CacheOptions,

    /// Lease settings
    pub leader_election: LeaderElectionConfig,

    /// Address for `/healthz` and `/readyz`; `"0"` or empty disables the server
    pub health_probe_bind_address: String,

    /// Address for `/metrics`; `"0"` or empty disables the server
    pub metrics_bind_address: String,
}

/// Parses a Go-style `host:port` bind address.
///
/// An empty host (`:9441`) listens on all interfaces and `localhost` maps to
/// the IPv4 loopback. `"0"` and `""` disable the listener and yield `None`.
pub fn parse_bind_address(addr: &str) -> Result<Option<SocketAddr>, ManagerError> {
    let invalid = |reason: &str| ManagerError::InvalidBindAddress {
        addr: addr.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = addr.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(None);
    }

    let (host, port) = trimmed
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;

    let ip = match host.trim_start_matches('[').trim_end_matches(']') {
        "" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        literal => literal
            .parse()
            .map_err(|_| invalid("host must be empty, localhost or an IP literal"))?,
    };

    Ok(Some(SocketAddr::new(ip, port)))
}
