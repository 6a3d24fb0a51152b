//! Declarative configuration loading from YAML, TOML, and environment variables.
//!
//! File formats are deserialized into the mirror structs below and then fed
//! through the programmatic [`ClientConfig`](crate::config::ClientConfig)
//! builder, so both paths share the same validation.
//!
//! # Supported Formats
//!
//! - **YAML** (requires `config-file` feature): `ClientConfig::from_yaml("gridlink.yaml")`
//! - **TOML** (requires `config-file` feature): `ClientConfig::from_toml("gridlink.toml")`
//! - **Environment Variables** (always available): `ClientConfig::from_env()`
//!
//! # Example YAML
//!
//! ```yaml
//! cluster-name: production
//! client-name: orders-service
//! network:
//!   addresses:
//!     - "10.0.0.1:5701"
//!     - "10.0.0.2:5701"
//!   connection-timeout-ms: 10000
//!   heartbeat-interval-ms: 5000
//!   heartbeat-timeout-ms: 60000
//!   smart-routing: true
//!   reconnect-mode: on
//!   membership-refresh-interval-ms: 30000
//! retry:
//!   initial-backoff-ms: 100
//!   max-backoff-ms: 30000
//!   multiplier: 2.0
//!   jitter: 0.2
//!   connection-attempt-limit: 10
//! statistics:
//!   enabled: true
//!   period-seconds: 3
//! invocation-timeout-seconds: 120
//! invocation-retry-count: 5
//! redo-operation: false
//! max-concurrent-invocations: 512
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError, ReconnectMode};

/// Top-level file-based configuration.
///
/// Mirrors [`ClientConfig`](crate::config::ClientConfig) with serde-friendly
/// types and converts into it via [`TryFrom`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Cluster name to connect to.
    pub cluster_name: Option<String>,
    /// Client name announced in the handshake.
    pub client_name: Option<String>,
    /// Network configuration.
    pub network: Option<FileNetworkConfig>,
    /// Retry/reconnection configuration.
    pub retry: Option<FileRetryConfig>,
    /// Credentials.
    pub security: Option<FileSecurityConfig>,
    /// Statistics reporting.
    pub statistics: Option<FileStatisticsConfig>,
    /// Invocation timeout in seconds.
    pub invocation_timeout_seconds: Option<u64>,
    /// Number of retry attempts for retryable invocations.
    pub invocation_retry_count: Option<u32>,
    /// Whether to retry non-idempotent invocations after delivery.
    pub redo_operation: Option<bool>,
    /// Maximum concurrent invocations (0 = unlimited, default).
    pub max_concurrent_invocations: Option<usize>,
}

/// File-based network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileNetworkConfig {
    /// Cluster member addresses.
    pub addresses: Option<Vec<String>>,
    /// Cloud discovery settings.
    pub cloud: Option<FileCloudConfig>,
    /// Connection timeout in milliseconds.
    pub connection_timeout_ms: Option<u64>,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: Option<u64>,
    /// Heartbeat timeout in milliseconds.
    pub heartbeat_timeout_ms: Option<u64>,
    /// Whether to use smart routing (route to partition owner).
    pub smart_routing: Option<bool>,
    /// Reconnection mode: "off" or "on".
    pub reconnect_mode: Option<String>,
    /// Interval between cluster view pulls in milliseconds.
    pub membership_refresh_interval_ms: Option<u64>,
    /// Largest accepted frame in bytes.
    pub max_frame_size: Option<usize>,
    /// TLS settings.
    pub tls: Option<FileTlsConfig>,
}

/// File-based cloud discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileCloudConfig {
    /// Discovery token.
    pub discovery_token: Option<String>,
    /// Coordinator base URL.
    pub url: Option<String>,
}

/// File-based TLS configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileTlsConfig {
    /// Whether TLS is enabled.
    pub enabled: Option<bool>,
    /// CA certificate file.
    pub ca_cert_path: Option<String>,
    /// Client certificate file.
    pub client_cert_path: Option<String>,
    /// Client private key file.
    pub client_key_path: Option<String>,
    /// SNI server name override.
    pub server_name: Option<String>,
    /// Whether to verify the member hostname.
    pub verify_hostname: Option<bool>,
}

/// File-based retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileRetryConfig {
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: Option<u64>,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: Option<u64>,
    /// Backoff multiplier.
    pub multiplier: Option<f64>,
    /// Jitter factor (0.0 to 1.0).
    pub jitter: Option<f64>,
    /// Consecutive connect failures before a member is marked unreachable.
    pub connection_attempt_limit: Option<u32>,
}

/// File-based security configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileSecurityConfig {
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Token.
    pub token: Option<String>,
}

/// File-based statistics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileStatisticsConfig {
    /// Whether periodic reporting is enabled.
    pub enabled: Option<bool>,
    /// Reporting period in seconds.
    pub period_seconds: Option<u64>,
}

impl TryFrom<FileConfig> for ClientConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = ClientConfigBuilder::new();

        if let Some(name) = file.cluster_name {
            builder = builder.cluster_name(name);
        }

        if let Some(name) = file.client_name {
            builder = builder.client_name(name);
        }

        if let Some(net) = file.network {
            let reconnect_mode = net
                .reconnect_mode
                .as_deref()
                .map(ReconnectMode::parse)
                .transpose()?;

            builder = builder.network(|mut n| {
                if let Some(addrs) = net.addresses {
                    n = n.addresses(addrs);
                }
                if let Some(cloud) = net.cloud {
                    if let Some(token) = cloud.discovery_token {
                        n = n.cloud_discovery(token);
                    }
                    if let Some(url) = cloud.url {
                        n = n.cloud_coordinator_url(url);
                    }
                }
                if let Some(ms) = net.connection_timeout_ms {
                    n = n.connection_timeout(Duration::from_millis(ms));
                }
                if let Some(ms) = net.heartbeat_interval_ms {
                    n = n.heartbeat_interval(Duration::from_millis(ms));
                }
                if let Some(ms) = net.heartbeat_timeout_ms {
                    n = n.heartbeat_timeout(Duration::from_millis(ms));
                }
                if let Some(smart) = net.smart_routing {
                    n = n.smart_routing(smart);
                }
                if let Some(mode) = reconnect_mode {
                    n = n.reconnect_mode(mode);
                }
                if let Some(ms) = net.membership_refresh_interval_ms {
                    n = n.membership_refresh_interval(Duration::from_millis(ms));
                }
                if let Some(bytes) = net.max_frame_size {
                    n = n.max_frame_size(bytes);
                }
                if let Some(tls) = net.tls {
                    n = n.tls(|mut t| {
                        if let Some(v) = tls.enabled {
                            t = t.enabled(v);
                        }
                        if let Some(path) = tls.ca_cert_path {
                            t = t.ca_cert_path(path);
                        }
                        if let (Some(cert), Some(key)) = (tls.client_cert_path, tls.client_key_path)
                        {
                            t = t.client_auth(cert, key);
                        }
                        if let Some(name) = tls.server_name {
                            t = t.server_name(name);
                        }
                        if let Some(v) = tls.verify_hostname {
                            t = t.verify_hostname(v);
                        }
                        t
                    });
                }
                n
            });
        }

        if let Some(retry) = file.retry {
            builder = builder.retry(|mut r| {
                if let Some(ms) = retry.initial_backoff_ms {
                    r = r.initial_backoff(Duration::from_millis(ms));
                }
                if let Some(ms) = retry.max_backoff_ms {
                    r = r.max_backoff(Duration::from_millis(ms));
                }
                if let Some(m) = retry.multiplier {
                    r = r.multiplier(m);
                }
                if let Some(j) = retry.jitter {
                    r = r.jitter(j);
                }
                if let Some(limit) = retry.connection_attempt_limit {
                    r = r.connection_attempt_limit(limit);
                }
                r
            });
        }

        if let Some(security) = file.security {
            builder = builder.security(|mut s| {
                if let Some(username) = security.username {
                    s = s.username(username);
                }
                if let Some(password) = security.password {
                    s = s.password(password);
                }
                if let Some(token) = security.token {
                    s = s.token(token);
                }
                s
            });
        }

        if let Some(stats) = file.statistics {
            builder = builder.statistics(|mut s| {
                if let Some(enabled) = stats.enabled {
                    s = s.enabled(enabled);
                }
                if let Some(secs) = stats.period_seconds {
                    s = s.period(Duration::from_secs(secs));
                }
                s
            });
        }

        if let Some(secs) = file.invocation_timeout_seconds {
            builder = builder.invocation_timeout(Duration::from_secs(secs));
        }

        if let Some(count) = file.invocation_retry_count {
            builder = builder.invocation_retry_count(count);
        }

        if let Some(redo) = file.redo_operation {
            builder = builder.redo_operation(redo);
        }

        if let Some(max) = file.max_concurrent_invocations {
            builder = builder.max_concurrent_invocations(max);
        }

        builder.build()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::new(format!("invalid value '{}' for {}", value, name)))
}

impl ClientConfig {
    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read YAML config file: {e}")))?;
        let file_config: FileConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse YAML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        let file_config: FileConfig = toml_crate::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// This method is always available (no feature flag required). Unset
    /// variables keep their defaults; malformed values are rejected.
    ///
    /// # Supported Environment Variables
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `GRIDLINK_CLUSTER_NAME` | `cluster_name` |
    /// | `GRIDLINK_CLIENT_NAME` | `client_name` |
    /// | `GRIDLINK_ADDRESSES` | Comma-separated addresses (e.g., `10.0.0.1:5701,10.0.0.2:5701`) |
    /// | `GRIDLINK_CLOUD_DISCOVERY_TOKEN` | Cloud discovery token |
    /// | `GRIDLINK_CLOUD_URL` | Cloud coordinator base URL |
    /// | `GRIDLINK_CONNECTION_TIMEOUT_MS` | Connection timeout in milliseconds |
    /// | `GRIDLINK_SMART_ROUTING` | `"true"` or `"false"` |
    /// | `GRIDLINK_RECONNECT_MODE` | `"on"` or `"off"` |
    /// | `GRIDLINK_CONNECTION_ATTEMPT_LIMIT` | Connect failures before a member is unreachable |
    /// | `GRIDLINK_INVOCATION_TIMEOUT_SECONDS` | Invocation timeout in seconds |
    /// | `GRIDLINK_INVOCATION_RETRY_COUNT` | Number of retry attempts |
    /// | `GRIDLINK_REDO_OPERATION` | `"true"` or `"false"` |
    /// | `GRIDLINK_MAX_CONCURRENT_INVOCATIONS` | Maximum concurrent invocations |
    /// | `GRIDLINK_STATISTICS_ENABLED` | `"true"` or `"false"` |
    /// | `GRIDLINK_STATISTICS_PERIOD_SECONDS` | Statistics period in seconds |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from `GRIDLINK_*` variables supplied by `lookup`.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut file_config = FileConfig::default();

        if let Some(val) = lookup("GRIDLINK_CLUSTER_NAME") {
            file_config.cluster_name = Some(val);
        }

        if let Some(val) = lookup("GRIDLINK_CLIENT_NAME") {
            file_config.client_name = Some(val);
        }

        if let Some(val) = lookup("GRIDLINK_ADDRESSES") {
            file_config.network.get_or_insert_with(Default::default).addresses = Some(
                val.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        if let Some(val) = lookup("GRIDLINK_CLOUD_DISCOVERY_TOKEN") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .cloud
                .get_or_insert_with(Default::default)
                .discovery_token = Some(val);
        }

        if let Some(val) = lookup("GRIDLINK_CLOUD_URL") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .cloud
                .get_or_insert_with(Default::default)
                .url = Some(val);
        }

        if let Some(val) = lookup("GRIDLINK_CONNECTION_TIMEOUT_MS") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .connection_timeout_ms = Some(parse_env("GRIDLINK_CONNECTION_TIMEOUT_MS", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_SMART_ROUTING") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .smart_routing = Some(parse_env("GRIDLINK_SMART_ROUTING", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_RECONNECT_MODE") {
            file_config
                .network
                .get_or_insert_with(Default::default)
                .reconnect_mode = Some(val);
        }

        if let Some(val) = lookup("GRIDLINK_CONNECTION_ATTEMPT_LIMIT") {
            file_config
                .retry
                .get_or_insert_with(Default::default)
                .connection_attempt_limit =
                Some(parse_env("GRIDLINK_CONNECTION_ATTEMPT_LIMIT", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_INVOCATION_TIMEOUT_SECONDS") {
            file_config.invocation_timeout_seconds =
                Some(parse_env("GRIDLINK_INVOCATION_TIMEOUT_SECONDS", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_INVOCATION_RETRY_COUNT") {
            file_config.invocation_retry_count =
                Some(parse_env("GRIDLINK_INVOCATION_RETRY_COUNT", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_REDO_OPERATION") {
            file_config.redo_operation = Some(parse_env("GRIDLINK_REDO_OPERATION", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_MAX_CONCURRENT_INVOCATIONS") {
            file_config.max_concurrent_invocations =
                Some(parse_env("GRIDLINK_MAX_CONCURRENT_INVOCATIONS", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_STATISTICS_ENABLED") {
            file_config
                .statistics
                .get_or_insert_with(Default::default)
                .enabled = Some(parse_env("GRIDLINK_STATISTICS_ENABLED", &val)?);
        }

        if let Some(val) = lookup("GRIDLINK_STATISTICS_PERIOD_SECONDS") {
            file_config
                .statistics
                .get_or_insert_with(Default::default)
                .period_seconds = Some(parse_env("GRIDLINK_STATISTICS_PERIOD_SECONDS", &val)?);
        }

        file_config.try_into()
    }
}

/// Loads a configuration file, auto-detecting format by extension.
///
/// Supports `.yaml`, `.yml`, and `.toml` extensions.
/// Requires the `config-file` feature.
#[cfg(feature = "config-file")]
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ClientConfig::from_yaml(path),
        Some("toml") => ClientConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext} (expected .yaml, .yml, or .toml)"
        ))),
        None => Err(ConfigError::new(
            "config file has no extension; expected .yaml, .yml, or .toml",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_file_config_defaults_produce_valid_client_config() {
        let config: ClientConfig = FileConfig::default().try_into().unwrap();
        assert_eq!(config.cluster_name(), "dev");
    }

    #[test]
    fn test_file_config_with_network() {
        let file_config = FileConfig {
            network: Some(FileNetworkConfig {
                addresses: Some(vec!["127.0.0.1:5701".to_string()]),
                connection_timeout_ms: Some(10_000),
                smart_routing: Some(false),
                reconnect_mode: Some("off".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config: ClientConfig = file_config.try_into().unwrap();
        assert_eq!(config.network().addresses().len(), 1);
        assert_eq!(config.network().connection_timeout(), Duration::from_secs(10));
        assert!(!config.network().smart_routing());
        assert_eq!(config.network().reconnect_mode(), ReconnectMode::Off);
    }

    #[test]
    fn test_file_config_unknown_reconnect_mode_fails() {
        let file_config = FileConfig {
            network: Some(FileNetworkConfig {
                reconnect_mode: Some("sometimes".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(ClientConfig::try_from(file_config).is_err());
    }

    #[test]
    fn test_file_config_with_retry_and_invocation() {
        let file_config = FileConfig {
            retry: Some(FileRetryConfig {
                initial_backoff_ms: Some(200),
                max_backoff_ms: Some(60_000),
                multiplier: Some(3.0),
                jitter: Some(0.1),
                connection_attempt_limit: Some(4),
            }),
            invocation_timeout_seconds: Some(60),
            invocation_retry_count: Some(7),
            redo_operation: Some(true),
            max_concurrent_invocations: Some(256),
            ..Default::default()
        };
        let config: ClientConfig = file_config.try_into().unwrap();
        assert_eq!(config.retry().initial_backoff(), Duration::from_millis(200));
        assert_eq!(config.retry().max_backoff(), Duration::from_secs(60));
        assert_eq!(config.retry().multiplier(), 3.0);
        assert_eq!(config.retry().jitter(), 0.1);
        assert_eq!(config.retry().connection_attempt_limit(), 4);
        assert_eq!(config.invocation_timeout(), Duration::from_secs(60));
        assert_eq!(config.invocation_retry_count(), 7);
        assert!(config.redo_operation());
        assert_eq!(config.max_concurrent_invocations(), 256);
    }

    #[cfg(feature = "cloud")]
    #[test]
    fn test_file_config_cloud_and_statistics() {
        let file_config = FileConfig {
            network: Some(FileNetworkConfig {
                cloud: Some(FileCloudConfig {
                    discovery_token: Some("tok".to_string()),
                    url: Some("https://coordinator.test".to_string()),
                }),
                ..Default::default()
            }),
            statistics: Some(FileStatisticsConfig {
                enabled: Some(true),
                period_seconds: Some(5),
            }),
            ..Default::default()
        };
        let config: ClientConfig = file_config.try_into().unwrap();
        let cloud = config.network().cloud().unwrap();
        assert_eq!(cloud.discovery_token(), "tok");
        assert_eq!(cloud.coordinator_url(), "https://coordinator.test");
        assert!(config.statistics().enabled());
        assert_eq!(config.statistics().period(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_env_with_values() {
        let config = ClientConfig::from_env_with(env(&[
            ("GRIDLINK_CLUSTER_NAME", "test-cluster"),
            ("GRIDLINK_ADDRESSES", "10.0.0.1:5701, 10.0.0.2:5701"),
            ("GRIDLINK_SMART_ROUTING", "false"),
            ("GRIDLINK_CONNECTION_ATTEMPT_LIMIT", "3"),
            ("GRIDLINK_REDO_OPERATION", "true"),
        ]))
        .unwrap();
        assert_eq!(config.cluster_name(), "test-cluster");
        assert_eq!(
            config.network().addresses(),
            &["10.0.0.1:5701".to_string(), "10.0.0.2:5701".to_string()]
        );
        assert!(!config.network().smart_routing());
        assert_eq!(config.retry().connection_attempt_limit(), 3);
        assert!(config.redo_operation());
    }

    #[test]
    fn test_from_env_rejects_malformed_number() {
        let result = ClientConfig::from_env_with(env(&[(
            "GRIDLINK_INVOCATION_TIMEOUT_SECONDS",
            "soon",
        )]));
        assert!(result
            .unwrap_err()
            .message()
            .contains("GRIDLINK_INVOCATION_TIMEOUT_SECONDS"));
    }

    #[test]
    fn test_from_env_empty_is_default() {
        let config = ClientConfig::from_env_with(|_| None).unwrap();
        assert_eq!(config.cluster_name(), "dev");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn test_yaml_parse() {
        let yaml = r#"
cluster-name: yaml-test
network:
  addresses: ["10.0.0.1:5701"]
  reconnect-mode: off
retry:
  connection-attempt-limit: 2
invocation-timeout-seconds: 30
"#;
        let parsed: FileConfig = serde_yaml::from_str(yaml).unwrap();
        let config: ClientConfig = parsed.try_into().unwrap();
        assert_eq!(config.cluster_name(), "yaml-test");
        assert_eq!(config.network().reconnect_mode(), ReconnectMode::Off);
        assert_eq!(config.retry().connection_attempt_limit(), 2);
        assert_eq!(config.invocation_timeout(), Duration::from_secs(30));
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn test_toml_round_trip() {
        let file_config = FileConfig {
            cluster_name: Some("toml-test".to_string()),
            max_concurrent_invocations: Some(128),
            ..Default::default()
        };
        let toml_str = toml_crate::to_string(&file_config).unwrap();
        let parsed: FileConfig = toml_crate::from_str(&toml_str).unwrap();
        assert_eq!(parsed.cluster_name.as_deref(), Some("toml-test"));
        assert_eq!(parsed.max_concurrent_invocations, Some(128));
    }
}
