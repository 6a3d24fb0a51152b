//! Cluster member discovery mechanisms.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use gridlink_core::{GridError, Result};

/// Port assumed when an address names only a host.
pub const DEFAULT_MEMBER_PORT: u16 = 5701;

/// Trait for discovering cluster member addresses.
#[async_trait]
pub trait ClusterDiscovery: Send + Sync + std::fmt::Debug {
    /// Discovers available cluster member addresses.
    async fn discover(&self) -> Result<Vec<SocketAddr>>;
}

/// Splits `address` into host and port, applying [`DEFAULT_MEMBER_PORT`]
/// when no port is given.
///
/// Accepts `ip:port`, `[v6]:port`, bare IPv4/IPv6 literals, `host:port` and
/// bare host names.
pub fn split_host_port(address: &str) -> Result<(String, u16)> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(GridError::Configuration(
            "member address must not be empty".to_string(),
        ));
    }

    if let Ok(addr) = trimmed.parse::<SocketAddr>() {
        return Ok((addr.ip().to_string(), addr.port()));
    }
    if let Ok(ip) = trimmed.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return Ok((ip.to_string(), DEFAULT_MEMBER_PORT));
    }

    match trimmed.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                GridError::Configuration(format!("member address '{}' has an invalid port", address))
            })?;
            if host.is_empty() {
                return Err(GridError::Configuration(format!(
                    "member address '{}' has no host",
                    address
                )));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((trimmed.to_string(), DEFAULT_MEMBER_PORT)),
    }
}

/// Resolves one configured address to socket addresses through DNS.
pub async fn resolve_address(address: &str) -> Result<Vec<SocketAddr>> {
    let (host, port) = split_host_port(address)?;
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let resolved = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| GridError::Transport(format!("failed to resolve '{}': {}", address, e)))?;
    Ok(resolved.collect())
}

/// Static address discovery using a pre-configured list of addresses.
///
/// Entries may be host names; they are resolved on every `discover` call, so
/// DNS changes are picked up when the client re-bootstraps.
#[derive(Debug, Clone)]
pub struct StaticAddressDiscovery {
    addresses: Vec<String>,
}

impl StaticAddressDiscovery {
    /// Creates a new static discovery with the given addresses.
    pub fn new<I, A>(addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        Self {
            addresses: addresses.into_iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Creates a static discovery from a single address.
    pub fn from_address(address: SocketAddr) -> Self {
        Self::new([address])
    }

    /// Returns the configured addresses.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}

impl Default for StaticAddressDiscovery {
    fn default() -> Self {
        Self::new([format!("127.0.0.1:{}", DEFAULT_MEMBER_PORT)])
    }
}

#[async_trait]
impl ClusterDiscovery for StaticAddressDiscovery {
    async fn discover(&self) -> Result<Vec<SocketAddr>> {
        let mut resolved = Vec::with_capacity(self.addresses.len());
        for address in &self.addresses {
            match resolve_address(address).await {
                Ok(addrs) => resolved.extend(addrs),
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "skipping unresolvable address");
                }
            }
        }
        Ok(resolved)
    }
}

/// Turns the configured discovery sources into a de-duplicated candidate list.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    sources: Vec<Arc<dyn ClusterDiscovery>>,
}

impl AddressResolver {
    /// Creates a resolver over a single discovery source.
    pub fn new(discovery: impl ClusterDiscovery + 'static) -> Self {
        Self {
            sources: vec![Arc::new(discovery)],
        }
    }

    /// Creates a resolver that queries every source in order.
    pub fn from_sources(sources: Vec<Arc<dyn ClusterDiscovery>>) -> Self {
        Self { sources }
    }

    /// Adds another discovery source.
    pub fn with_source(mut self, discovery: impl ClusterDiscovery + 'static) -> Self {
        self.sources.push(Arc::new(discovery));
        self
    }

    /// Returns the candidate addresses, keeping first-seen order.
    ///
    /// A failing source is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `GridError::Transport` if no source produced an address.
    pub async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut last_error = None;

        for source in &self.sources {
            match source.discover().await {
                Ok(addresses) => {
                    for address in addresses {
                        if seen.insert(address) {
                            candidates.push(address);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source = ?source, error = %e, "discovery source failed");
                    last_error = Some(e);
                }
            }
        }

        if candidates.is_empty() {
            return Err(match last_error {
                Some(e) => GridError::Transport(format!("no member address could be resolved: {}", e)),
                None => GridError::Transport("no member address could be resolved".to_string()),
            });
        }

        tracing::debug!(count = candidates.len(), "resolved candidate member addresses");
        Ok(candidates)
    }
}
