//! Cloud-hosted cluster discovery.
//!
//! Members of a managed cluster are listed by a coordinator service. The
//! client asks it for the member list with its discovery token and connects
//! to the public addresses it returns.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use gridlink_core::{GridError, Result};
use serde::Deserialize;

use super::discovery::{resolve_address, ClusterDiscovery};
use crate::config::CloudConfig;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of the coordinator's member list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudMemberAddress {
    /// Address the member binds inside the cloud network.
    #[serde(rename = "private-address")]
    pub private_address: String,
    /// Address reachable from outside; the client connects here.
    #[serde(rename = "public-address")]
    pub public_address: String,
}

/// Discovers cluster members through the cloud coordinator API.
#[derive(Debug, Clone)]
pub struct CloudDiscovery {
    discovery_token: String,
    coordinator_url: String,
    timeout: Duration,
    #[cfg(test)]
    mock_body: Option<String>,
}

impl CloudDiscovery {
    /// Creates a discovery source from the client's cloud settings.
    pub fn new(config: &CloudConfig) -> Self {
        Self {
            discovery_token: config.discovery_token().to_string(),
            coordinator_url: config.coordinator_url().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            #[cfg(test)]
            mock_body: None,
        }
    }

    /// Sets the HTTP request timeout (default: 10 seconds).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the discovery token.
    pub fn discovery_token(&self) -> &str {
        &self.discovery_token
    }

    /// Returns the coordinator base URL.
    pub fn coordinator_url(&self) -> &str {
        &self.coordinator_url
    }

    /// Returns the HTTP request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[cfg(all(test, feature = "cloud"))]
    fn with_mock_body(mut self, body: impl Into<String>) -> Self {
        self.mock_body = Some(body.into());
        self
    }

    /// Returns the member-list URL for the configured token.
    pub fn discovery_url(&self) -> String {
        format!(
            "{}/cluster/discovery?token={}",
            self.coordinator_url, self.discovery_token
        )
    }

    /// Parses the coordinator response into public member addresses.
    ///
    /// # Errors
    ///
    /// Returns `GridError::Serialization` if the body is not a JSON array of
    /// `{"private-address", "public-address"}` objects.
    pub fn parse_response(body: &str) -> Result<Vec<String>> {
        let entries: Vec<CloudMemberAddress> = serde_json::from_str(body).map_err(|e| {
            GridError::Serialization(format!("invalid cloud discovery response: {}", e))
        })?;

        Ok(entries
            .into_iter()
            .map(|entry| entry.public_address)
            .filter(|address| !address.trim().is_empty())
            .collect())
    }

    async fn fetch_body(&self) -> Result<String> {
        #[cfg(test)]
        if let Some(ref body) = self.mock_body {
            return Ok(body.clone());
        }

        self.request_member_list().await
    }

    #[cfg(feature = "cloud")]
    async fn request_member_list(&self) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GridError::Transport(format!("failed to create HTTP client: {}", e)))?;

        let response = client
            .get(self.discovery_url())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| GridError::Transport(format!("cloud coordinator request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GridError::Transport(format!(
                "cloud coordinator returned status: {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| GridError::Transport(format!("failed to read coordinator response: {}", e)))
    }

    #[cfg(not(feature = "cloud"))]
    async fn request_member_list(&self) -> Result<String> {
        Err(GridError::Configuration(
            "cloud discovery requires the `cloud` feature".to_string(),
        ))
    }
}

#[async_trait]
impl ClusterDiscovery for CloudDiscovery {
    async fn discover(&self) -> Result<Vec<SocketAddr>> {
        let body = self.fetch_body().await?;
        let public_addresses = Self::parse_response(&body)?;

        let mut resolved = Vec::with_capacity(public_addresses.len());
        for address in &public_addresses {
            match resolve_address(address).await {
                Ok(addrs) => resolved.extend(addrs),
                Err(e) => tracing::warn!(address = %address, error = %e, "skipping cloud member address"),
            }
        }

        if resolved.is_empty() {
            tracing::warn!("cloud discovery found no members");
        } else {
            tracing::info!(count = resolved.len(), "cloud discovery found members");
        }
        Ok(resolved)
    }
}


#[cfg(test)]
mod parse_tests {
    use super::*;

    #[test]
    fn test_parse_response_takes_public_address() {
        let body = r#"[{"private-address":"10.0.0.1:5701","public-address":"54.0.0.1:30000"}]"#;
        assert_eq!(
            CloudDiscovery::parse_response(body).unwrap(),
            vec!["54.0.0.1:30000".to_string()]
        );
    }

    #[test]
    fn test_parse_response_skips_blank_public_address() {
        let body = r#"[
            {"private-address":"10.0.0.1:5701","public-address":""},
            {"private-address":"10.0.0.2:5701","public-address":"member-b.example.com:30001"}
        ]"#;
        assert_eq!(
            CloudDiscovery::parse_response(body).unwrap(),
            vec!["member-b.example.com:30001".to_string()]
        );
    }

    #[test]
    fn test_parse_response_rejects_missing_fields() {
        let body = r#"[{"address":"10.0.0.1:5701"}]"#;
        assert!(CloudDiscovery::parse_response(body).is_err());
    }
}
