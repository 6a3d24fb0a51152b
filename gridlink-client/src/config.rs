//! Client configuration types and builders.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gridlink_core::protocol::{Credentials, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
use gridlink_core::GridError;
use thiserror::Error;

/// Default cluster name.
const DEFAULT_CLUSTER_NAME: &str = "dev";
/// Address tried when neither addresses nor cloud discovery are configured.
const DEFAULT_ADDRESS: &str = "127.0.0.1:5701";
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default heartbeat interval.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Default heartbeat timeout.
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default interval between cluster view pulls.
const DEFAULT_MEMBERSHIP_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// Default cloud coordinator base URL.
pub const DEFAULT_CLOUD_COORDINATOR_URL: &str = "https://coordinator.gridlink.cloud";
/// Default initial retry backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Default maximum retry backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Default retry multiplier.
const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
/// Default jitter factor.
const DEFAULT_JITTER: f64 = 0.2;
/// Default consecutive connect failures before a member is marked unreachable.
const DEFAULT_CONNECTION_ATTEMPT_LIMIT: u32 = 10;
/// Default invocation timeout.
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default number of retries per invocation.
const DEFAULT_INVOCATION_RETRY_COUNT: u32 = 5;
/// Default statistics reporting period.
const DEFAULT_STATISTICS_PERIOD: Duration = Duration::from_secs(3);

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration error: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the validation message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ConfigError> for GridError {
    fn from(err: ConfigError) -> Self {
        GridError::Configuration(err.message)
    }
}

/// What the client does after losing connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectMode {
    /// Lost connections stay lost; the client goes offline on total loss.
    Off,
    /// Lost connections are repaired in the background.
    #[default]
    On,
}

impl ReconnectMode {
    /// Returns true if reconnection is enabled.
    pub fn is_enabled(self) -> bool {
        matches!(self, ReconnectMode::On)
    }

    /// Parses `"off"` or `"on"`, case-insensitively.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Ok(ReconnectMode::Off),
            "on" => Ok(ReconnectMode::On),
            other => Err(ConfigError::new(format!(
                "unknown reconnect mode '{}' (expected 'off' or 'on')",
                other
            ))),
        }
    }
}

/// Cloud discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    discovery_token: String,
    coordinator_url: String,
}

impl CloudConfig {
    /// Returns the discovery token.
    pub fn discovery_token(&self) -> &str {
        &self.discovery_token
    }

    /// Returns the coordinator base URL.
    pub fn coordinator_url(&self) -> &str {
        &self.coordinator_url
    }
}

/// Network configuration for cluster connections.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    addresses: Vec<String>,
    cloud: Option<CloudConfig>,
    connection_timeout: Duration,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    smart_routing: bool,
    reconnect_mode: ReconnectMode,
    membership_refresh_interval: Duration,
    max_frame_size: usize,
    tls: TlsConfig,
}

impl NetworkConfig {
    /// Returns the configured member addresses (`host:port` or `host`).
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Returns the cloud discovery settings, if configured.
    pub fn cloud(&self) -> Option<&CloudConfig> {
        self.cloud.as_ref()
    }

    /// Returns the connection timeout duration, which also bounds the handshake.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns the heartbeat interval duration.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns how long a connection may stay silent before it is declared dead.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Returns whether requests are routed to partition owners.
    pub fn smart_routing(&self) -> bool {
        self.smart_routing
    }

    /// Returns the reconnect mode.
    pub fn reconnect_mode(&self) -> ReconnectMode {
        self.reconnect_mode
    }

    /// Returns the interval between cluster view pulls.
    pub fn membership_refresh_interval(&self) -> Duration {
        self.membership_refresh_interval
    }

    /// Returns the largest accepted frame in bytes.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Returns the TLS configuration.
    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            addresses: vec![DEFAULT_ADDRESS.to_string()],
            cloud: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            smart_routing: true,
            reconnect_mode: ReconnectMode::On,
            membership_refresh_interval: DEFAULT_MEMBERSHIP_REFRESH_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tls: TlsConfig::default(),
        }
    }
}

/// Builder for `NetworkConfig`.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    addresses: Vec<String>,
    cloud_discovery_token: Option<String>,
    cloud_coordinator_url: Option<String>,
    connection_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Option<Duration>,
    smart_routing: Option<bool>,
    reconnect_mode: Option<ReconnectMode>,
    membership_refresh_interval: Option<Duration>,
    max_frame_size: Option<usize>,
    tls: TlsConfigBuilder,
}

impl NetworkConfigBuilder {
    /// Creates a new network configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member address such as `10.0.0.1:5701`, `node-a:5701` or `node-a`.
    pub fn add_address(mut self, address: impl ToString) -> Self {
        self.addresses.push(address.to_string());
        self
    }

    /// Sets the member addresses, replacing any previously configured.
    pub fn addresses<I, A>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToString,
    {
        self.addresses = addresses.into_iter().map(|a| a.to_string()).collect();
        self
    }

    /// Discovers members through the cloud coordinator using `token`.
    pub fn cloud_discovery(mut self, token: impl Into<String>) -> Self {
        self.cloud_discovery_token = Some(token.into());
        self
    }

    /// Overrides the cloud coordinator base URL.
    pub fn cloud_coordinator_url(mut self, url: impl Into<String>) -> Self {
        self.cloud_coordinator_url = Some(url.into());
        self
    }

    /// Sets the connection timeout duration.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the heartbeat interval duration.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the heartbeat timeout duration.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    /// Enables or disables routing to partition owners.
    pub fn smart_routing(mut self, enabled: bool) -> Self {
        self.smart_routing = Some(enabled);
        self
    }

    /// Sets the reconnect mode.
    pub fn reconnect_mode(mut self, mode: ReconnectMode) -> Self {
        self.reconnect_mode = Some(mode);
        self
    }

    /// Sets the interval between cluster view pulls.
    pub fn membership_refresh_interval(mut self, interval: Duration) -> Self {
        self.membership_refresh_interval = Some(interval);
        self
    }

    /// Sets the largest accepted frame in bytes.
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = Some(bytes);
        self
    }

    /// Configures TLS settings using a builder function.
    pub fn tls<F>(mut self, f: F) -> Self
    where
        F: FnOnce(TlsConfigBuilder) -> TlsConfigBuilder,
    {
        self.tls = f(self.tls);
        self
    }

    /// Enables TLS with default settings.
    pub fn enable_tls(mut self) -> Self {
        self.tls = self.tls.enabled(true);
        self
    }

    /// Builds the network configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - both addresses and cloud discovery are configured
    /// - an address is empty or has an invalid port
    /// - `heartbeat_timeout` does not exceed `heartbeat_interval`
    /// - any interval or timeout is zero
    /// - `max_frame_size` cannot hold a frame header
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        let cloud = match self.cloud_discovery_token {
            Some(token) => {
                if token.trim().is_empty() {
                    return Err(ConfigError::new("cloud discovery token must not be empty"));
                }
                if !self.addresses.is_empty() {
                    return Err(ConfigError::new(
                        "addresses and cloud discovery are mutually exclusive",
                    ));
                }
                if !cfg!(feature = "cloud") {
                    return Err(ConfigError::new(
                        "cloud discovery is configured but the crate was built without the `cloud` feature",
                    ));
                }
                Some(CloudConfig {
                    discovery_token: token,
                    coordinator_url: self
                        .cloud_coordinator_url
                        .unwrap_or_else(|| DEFAULT_CLOUD_COORDINATOR_URL.to_string()),
                })
            }
            None => None,
        };

        for address in &self.addresses {
            validate_address(address)?;
        }

        let addresses = if self.addresses.is_empty() && cloud.is_none() {
            vec![DEFAULT_ADDRESS.to_string()]
        } else {
            self.addresses
        };

        let connection_timeout = self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        let heartbeat_interval = self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        let heartbeat_timeout = self.heartbeat_timeout.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);
        let membership_refresh_interval = self
            .membership_refresh_interval
            .unwrap_or(DEFAULT_MEMBERSHIP_REFRESH_INTERVAL);
        let max_frame_size = self.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE);

        if connection_timeout.is_zero() {
            return Err(ConfigError::new("connection_timeout must be positive"));
        }
        if heartbeat_interval.is_zero() {
            return Err(ConfigError::new("heartbeat_interval must be positive"));
        }
        if heartbeat_timeout <= heartbeat_interval {
            return Err(ConfigError::new(
                "heartbeat_timeout must exceed heartbeat_interval",
            ));
        }
        if membership_refresh_interval.is_zero() {
            return Err(ConfigError::new(
                "membership_refresh_interval must be positive",
            ));
        }
        if max_frame_size <= FRAME_HEADER_SIZE {
            return Err(ConfigError::new(format!(
                "max_frame_size must exceed the {} byte frame header",
                FRAME_HEADER_SIZE
            )));
        }

        let tls = self.tls.build()?;

        Ok(NetworkConfig {
            addresses,
            cloud,
            connection_timeout,
            heartbeat_interval,
            heartbeat_timeout,
            smart_routing: self.smart_routing.unwrap_or(true),
            reconnect_mode: self.reconnect_mode.unwrap_or_default(),
            membership_refresh_interval,
            max_frame_size,
            tls,
        })
    }
}

fn validate_address(address: &str) -> Result<(), ConfigError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::new("member address must not be empty"));
    }
    if trimmed.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }
    if let Some((host, port)) = trimmed.rsplit_once(':') {
        if host.is_empty() {
            return Err(ConfigError::new(format!(
                "member address '{}' has no host",
                address
            )));
        }
        if !host.contains(':') && port.parse::<u16>().is_err() {
            return Err(ConfigError::new(format!(
                "member address '{}' has an invalid port",
                address
            )));
        }
    }
    Ok(())
}

/// Retry and backoff configuration shared by invocations and reconnection.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    connection_attempt_limit: u32,
}

impl RetryConfig {
    /// Returns the initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter factor applied to each backoff (0.0 to 1.0).
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns how many consecutive connect failures mark a member unreachable.
    pub fn connection_attempt_limit(&self) -> u32 {
        self.connection_attempt_limit
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            jitter: DEFAULT_JITTER,
            connection_attempt_limit: DEFAULT_CONNECTION_ATTEMPT_LIMIT,
        }
    }
}

impl From<RetryConfig> for RetryConfigBuilder {
    fn from(config: RetryConfig) -> Self {
        Self {
            initial_backoff: Some(config.initial_backoff),
            max_backoff: Some(config.max_backoff),
            multiplier: Some(config.multiplier),
            jitter: Some(config.jitter),
            connection_attempt_limit: Some(config.connection_attempt_limit),
        }
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
    connection_attempt_limit: Option<u32>,
}

impl RetryConfigBuilder {
    /// Creates a new retry configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial backoff duration.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the jitter factor (0.0 to 1.0).
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Sets how many consecutive connect failures mark a member unreachable.
    pub fn connection_attempt_limit(mut self, limit: u32) -> Self {
        self.connection_attempt_limit = Some(limit);
        self
    }

    /// Builds the retry configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `initial_backoff` exceeds `max_backoff`
    /// - `multiplier` is less than 1.0
    /// - `jitter` is outside 0.0 to 1.0
    /// - `connection_attempt_limit` is zero
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        let max_backoff = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF);
        let multiplier = self.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        let jitter = self.jitter.unwrap_or(DEFAULT_JITTER);
        let connection_attempt_limit = self
            .connection_attempt_limit
            .unwrap_or(DEFAULT_CONNECTION_ATTEMPT_LIMIT);

        if initial_backoff > max_backoff {
            return Err(ConfigError::new(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if multiplier < 1.0 {
            return Err(ConfigError::new("multiplier must be at least 1.0"));
        }

        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::new("jitter must be between 0.0 and 1.0"));
        }

        if connection_attempt_limit == 0 {
            return Err(ConfigError::new(
                "connection_attempt_limit must be at least 1",
            ));
        }

        Ok(RetryConfig {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter,
            connection_attempt_limit,
        })
    }
}

/// TLS configuration for secure connections.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    enabled: bool,
    ca_cert_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
    client_key_path: Option<PathBuf>,
    verify_hostname: bool,
    server_name: Option<String>,
}

impl TlsConfig {
    /// Returns whether TLS is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the path to the CA certificate file.
    pub fn ca_cert_path(&self) -> Option<&PathBuf> {
        self.ca_cert_path.as_ref()
    }

    /// Returns the path to the client certificate file.
    pub fn client_cert_path(&self) -> Option<&PathBuf> {
        self.client_cert_path.as_ref()
    }

    /// Returns the path to the client private key file.
    pub fn client_key_path(&self) -> Option<&PathBuf> {
        self.client_key_path.as_ref()
    }

    /// Returns whether the member certificate is verified.
    ///
    /// When false, any certificate the member presents is accepted.
    pub fn verify_hostname(&self) -> bool {
        self.verify_hostname
    }

    /// Returns the SNI name presented instead of the member host.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Returns true if client authentication is configured.
    pub fn has_client_auth(&self) -> bool {
        self.client_cert_path.is_some() && self.client_key_path.is_some()
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            verify_hostname: true,
            server_name: None,
        }
    }
}

/// Builder for `TlsConfig`.
#[derive(Debug, Clone, Default)]
pub struct TlsConfigBuilder {
    enabled: Option<bool>,
    ca_cert_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
    client_key_path: Option<PathBuf>,
    verify_hostname: Option<bool>,
    server_name: Option<String>,
}

impl TlsConfigBuilder {
    /// Creates a new TLS configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables TLS.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Sets the path to the CA certificate file for server verification.
    pub fn ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Sets client certificate and key paths for mutual TLS.
    ///
    /// The key must be unencrypted PEM (PKCS#8, PKCS#1 or SEC1). Encrypted
    /// keys are rejected with a configuration error when connecting.
    pub fn client_auth(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    /// Enables or disables verification of the member certificate.
    pub fn verify_hostname(mut self, verify: bool) -> Self {
        self.verify_hostname = Some(verify);
        self
    }

    /// Presents `name` as SNI and verifies the certificate against it.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Builds the TLS configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if TLS settings are given while TLS support was
    /// not compiled in, or if the server name is empty.
    pub fn build(self) -> Result<TlsConfig, ConfigError> {
        let enabled = self.enabled.unwrap_or(false);

        if enabled && !cfg!(feature = "tls") {
            return Err(ConfigError::new(
                "TLS is enabled but the crate was built without the `tls` feature",
            ));
        }

        if matches!(self.server_name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::new("TLS server_name must not be empty"));
        }

        Ok(TlsConfig {
            enabled,
            ca_cert_path: self.ca_cert_path,
            client_cert_path: self.client_cert_path,
            client_key_path: self.client_key_path,
            verify_hostname: self.verify_hostname.unwrap_or(true),
            server_name: self.server_name,
        })
    }
}

/// Security configuration for authentication.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

impl SecurityConfig {
    /// Returns the configured username.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the configured password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns the configured authentication token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns true if username/password credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Returns the credentials presented in the handshake.
    pub fn credentials(&self) -> Credentials {
        match (&self.username, &self.password, &self.token) {
            (Some(username), Some(password), _) => Credentials::UsernamePassword {
                username: username.clone(),
                password: password.clone(),
            },
            (_, _, Some(token)) => Credentials::Token(token.clone()),
            _ => Credentials::None,
        }
    }
}

/// Builder for `SecurityConfig`.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigBuilder {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

impl SecurityConfigBuilder {
    /// Creates a new security configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password for authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets both username and password for authentication.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username(username).password(password)
    }

    /// Sets the authentication token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builds the security configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Only one of `username` or `password` is set (both must be provided together)
    /// - Both credentials and token are set (mutually exclusive)
    pub fn build(self) -> Result<SecurityConfig, ConfigError> {
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::new(
                "both username and password must be provided together",
            ));
        }

        if self.token.is_some() && self.username.is_some() {
            return Err(ConfigError::new(
                "token and username/password authentication are mutually exclusive",
            ));
        }

        Ok(SecurityConfig {
            username: self.username,
            password: self.password,
            token: self.token,
        })
    }
}

/// Client statistics settings.
#[derive(Debug, Clone)]
pub struct StatisticsConfig {
    enabled: bool,
    period: Duration,
}

impl StatisticsConfig {
    /// Returns whether periodic statistics reporting is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the reporting period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period: DEFAULT_STATISTICS_PERIOD,
        }
    }
}

/// Builder for `StatisticsConfig`.
#[derive(Debug, Clone, Default)]
pub struct StatisticsConfigBuilder {
    enabled: Option<bool>,
    period: Option<Duration>,
}

impl StatisticsConfigBuilder {
    /// Creates a new statistics configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables periodic reporting.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Sets the reporting period.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Builds the statistics configuration.
    pub fn build(self) -> Result<StatisticsConfig, ConfigError> {
        let period = self.period.unwrap_or(DEFAULT_STATISTICS_PERIOD);
        if period.is_zero() {
            return Err(ConfigError::new("statistics period must be positive"));
        }
        Ok(StatisticsConfig {
            enabled: self.enabled.unwrap_or(false),
            period,
        })
    }
}

/// Main client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    cluster_name: String,
    client_name: Option<String>,
    network: NetworkConfig,
    retry: RetryConfig,
    security: SecurityConfig,
    statistics: StatisticsConfig,
    invocation_timeout: Duration,
    invocation_retry_count: u32,
    redo_operation: bool,
    max_concurrent_invocations: usize,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the cluster name.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns the configured client name, if any.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Returns the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the retry configuration.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the security configuration.
    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    /// Returns the statistics configuration.
    pub fn statistics(&self) -> &StatisticsConfig {
        &self.statistics
    }

    /// Returns the default deadline of an invocation.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Returns how many times a failed invocation may be retried.
    pub fn invocation_retry_count(&self) -> u32 {
        self.invocation_retry_count
    }

    /// Returns whether non-idempotent invocations are retried after their
    /// request may already have reached a member.
    pub fn redo_operation(&self) -> bool {
        self.redo_operation
    }

    /// Returns the cap on in-flight invocations (0 = unlimited).
    pub fn max_concurrent_invocations(&self) -> usize {
        self.max_concurrent_invocations
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            client_name: None,
            network: NetworkConfig::default(),
            retry: RetryConfig::default(),
            security: SecurityConfig::default(),
            statistics: StatisticsConfig::default(),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            invocation_retry_count: DEFAULT_INVOCATION_RETRY_COUNT,
            redo_operation: false,
            max_concurrent_invocations: 0,
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    cluster_name: Option<String>,
    client_name: Option<String>,
    network: NetworkConfigBuilder,
    retry: RetryConfigBuilder,
    security: SecurityConfigBuilder,
    statistics: StatisticsConfigBuilder,
    invocation_timeout: Option<Duration>,
    invocation_retry_count: Option<u32>,
    redo_operation: Option<bool>,
    max_concurrent_invocations: Option<usize>,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Sets the client name announced in the handshake.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Configures network settings using a builder function.
    pub fn network<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NetworkConfigBuilder) -> NetworkConfigBuilder,
    {
        self.network = f(self.network);
        self
    }

    /// Configures retry settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryConfigBuilder) -> RetryConfigBuilder,
    {
        self.retry = f(self.retry);
        self
    }

    /// Configures security settings using a builder function.
    pub fn security<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SecurityConfigBuilder) -> SecurityConfigBuilder,
    {
        self.security = f(self.security);
        self
    }

    /// Configures statistics settings using a builder function.
    pub fn statistics<F>(mut self, f: F) -> Self
    where
        F: FnOnce(StatisticsConfigBuilder) -> StatisticsConfigBuilder,
    {
        self.statistics = f(self.statistics);
        self
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: impl ToString) -> Self {
        self.network = self.network.add_address(address);
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connection_timeout(timeout);
        self
    }

    /// Sets credentials for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.security = self.security.credentials(username, password);
        self
    }

    /// Sets the default invocation deadline.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Sets how many times a failed invocation may be retried.
    pub fn invocation_retry_count(mut self, count: u32) -> Self {
        self.invocation_retry_count = Some(count);
        self
    }

    /// Allows retrying non-idempotent invocations whose request may have been delivered.
    pub fn redo_operation(mut self, enabled: bool) -> Self {
        self.redo_operation = Some(enabled);
        self
    }

    /// Caps in-flight invocations (0 = unlimited).
    pub fn max_concurrent_invocations(mut self, max: usize) -> Self {
        self.max_concurrent_invocations = Some(max);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let cluster_name = self
            .cluster_name
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        if cluster_name.is_empty() {
            return Err(ConfigError::new("cluster_name must not be empty"));
        }

        let invocation_timeout = self.invocation_timeout.unwrap_or(DEFAULT_INVOCATION_TIMEOUT);
        if invocation_timeout.is_zero() {
            return Err(ConfigError::new("invocation_timeout must be positive"));
        }

        let network = self.network.build()?;
        let retry = self.retry.build()?;
        let security = self.security.build()?;
        let statistics = self.statistics.build()?;

        Ok(ClientConfig {
            cluster_name,
            client_name: self.client_name,
            network,
            retry,
            security,
            statistics,
            invocation_timeout,
            invocation_retry_count: self
                .invocation_retry_count
                .unwrap_or(DEFAULT_INVOCATION_RETRY_COUNT),
            redo_operation: self.redo_operation.unwrap_or(false),
            max_concurrent_invocations: self.max_concurrent_invocations.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.cluster_name(), "dev");
        assert_eq!(config.network().addresses(), &["127.0.0.1:5701".to_string()]);
        assert!(config.network().smart_routing());
        assert_eq!(config.network().reconnect_mode(), ReconnectMode::On);
        assert_eq!(config.network().max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.invocation_timeout(), DEFAULT_INVOCATION_TIMEOUT);
        assert!(!config.redo_operation());
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let built = ClientConfig::builder().build().unwrap();
        let default = ClientConfig::default();
        assert_eq!(built.cluster_name(), default.cluster_name());
        assert_eq!(built.network().addresses(), default.network().addresses());
        assert_eq!(
            built.retry().connection_attempt_limit(),
            default.retry().connection_attempt_limit()
        );
        assert_eq!(
            built.invocation_retry_count(),
            default.invocation_retry_count()
        );
    }

    #[test]
    fn test_builder_empty_cluster_name_fails() {
        let result = ClientConfig::builder().cluster_name("").build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cluster_name must not be empty"));
    }

    #[test]
    fn test_builder_accepts_socket_addrs_and_hostnames() {
        let addr: SocketAddr = "192.168.1.1:5701".parse().unwrap();
        let config = ClientConfig::builder()
            .add_address(addr)
            .add_address("member-b:5702")
            .add_address("member-c")
            .build()
            .unwrap();

        assert_eq!(
            config.network().addresses(),
            &[
                "192.168.1.1:5701".to_string(),
                "member-b:5702".to_string(),
                "member-c".to_string()
            ]
        );
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = ClientConfig::builder().add_address("member-a:notaport").build();
        assert!(result.unwrap_err().message().contains("invalid port"));
    }

    #[cfg(feature = "cloud")]
    #[test]
    fn test_cloud_discovery_defaults_url() {
        let config = NetworkConfigBuilder::new()
            .cloud_discovery("abc123")
            .build()
            .unwrap();
        let cloud = config.cloud().unwrap();
        assert_eq!(cloud.discovery_token(), "abc123");
        assert_eq!(cloud.coordinator_url(), DEFAULT_CLOUD_COORDINATOR_URL);
        assert!(config.addresses().is_empty());
    }

    #[cfg(feature = "cloud")]
    #[test]
    fn test_cloud_discovery_custom_url() {
        let config = NetworkConfigBuilder::new()
            .cloud_discovery("abc123")
            .cloud_coordinator_url("https://coordinator.test")
            .build()
            .unwrap();
        assert_eq!(
            config.cloud().unwrap().coordinator_url(),
            "https://coordinator.test"
        );
    }

    #[cfg(not(feature = "cloud"))]
    #[test]
    fn test_cloud_requires_feature() {
        let result = NetworkConfigBuilder::new().cloud_discovery("abc123").build();
        assert!(result.unwrap_err().message().contains("`cloud` feature"));
    }

    #[test]
    fn test_cloud_and_addresses_are_exclusive() {
        let result = NetworkConfigBuilder::new()
            .add_address("10.0.0.1:5701")
            .cloud_discovery("abc123")
            .build();
        assert!(result.unwrap_err().message().contains("mutually exclusive"));
    }

    #[test]
    fn test_heartbeat_timeout_must_exceed_interval() {
        let result = NetworkConfigBuilder::new()
            .heartbeat_interval(Duration::from_secs(10))
            .heartbeat_timeout(Duration::from_secs(10))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_max_frame_size_must_hold_header() {
        let result = NetworkConfigBuilder::new().max_frame_size(8).build();
        assert!(result.unwrap_err().message().contains("max_frame_size"));
    }

    #[test]
    fn test_reconnect_mode_parse() {
        assert_eq!(ReconnectMode::parse("OFF").unwrap(), ReconnectMode::Off);
        assert_eq!(ReconnectMode::parse("on").unwrap(), ReconnectMode::On);
        assert!(ReconnectMode::parse("async").is_err());
        assert!(!ReconnectMode::Off.is_enabled());
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfigBuilder::new()
            .initial_backoff(Duration::from_millis(200))
            .max_backoff(Duration::from_secs(60))
            .multiplier(1.5)
            .jitter(0.5)
            .connection_attempt_limit(3)
            .build()
            .unwrap();

        assert_eq!(config.initial_backoff(), Duration::from_millis(200));
        assert_eq!(config.max_backoff(), Duration::from_secs(60));
        assert_eq!(config.multiplier(), 1.5);
        assert_eq!(config.jitter(), 0.5);
        assert_eq!(config.connection_attempt_limit(), 3);
    }

    #[test]
    fn test_retry_initial_exceeds_max_fails() {
        let result = RetryConfigBuilder::new()
            .initial_backoff(Duration::from_secs(60))
            .max_backoff(Duration::from_secs(10))
            .build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("initial_backoff must not exceed max_backoff"));
    }

    #[test]
    fn test_retry_validation() {
        assert!(RetryConfigBuilder::new().multiplier(0.5).build().is_err());
        assert!(RetryConfigBuilder::new().jitter(1.5).build().is_err());
        assert!(RetryConfigBuilder::new()
            .connection_attempt_limit(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_retry_builder_from_config() {
        let config = RetryConfigBuilder::new().jitter(0.0).build().unwrap();
        let rebuilt = RetryConfigBuilder::from(config)
            .multiplier(3.0)
            .build()
            .unwrap();
        assert_eq!(rebuilt.jitter(), 0.0);
        assert_eq!(rebuilt.multiplier(), 3.0);
    }

    #[test]
    fn test_security_credentials() {
        let config = SecurityConfigBuilder::new()
            .credentials("admin", "secret")
            .build()
            .unwrap();
        assert!(config.has_credentials());
        assert_eq!(
            config.credentials(),
            Credentials::UsernamePassword {
                username: "admin".to_string(),
                password: "secret".to_string()
            }
        );

        let token = SecurityConfigBuilder::new().token("t-1").build().unwrap();
        assert_eq!(token.credentials(), Credentials::Token("t-1".to_string()));

        let none = SecurityConfigBuilder::new().build().unwrap();
        assert_eq!(none.credentials(), Credentials::None);
    }

    #[test]
    fn test_security_validation() {
        assert!(SecurityConfigBuilder::new().username("admin").build().is_err());
        assert!(SecurityConfigBuilder::new()
            .credentials("a", "b")
            .token("t")
            .build()
            .is_err());
    }

    #[test]
    fn test_tls_config_defaults() {
        let config = TlsConfigBuilder::new().build().unwrap();
        assert!(!config.enabled());
        assert!(config.ca_cert_path().is_none());
        assert!(config.verify_hostname());
        assert!(config.server_name().is_none());
        assert!(!config.has_client_auth());
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn test_tls_requires_feature() {
        let result = TlsConfigBuilder::new().enabled(true).build();
        assert!(result.unwrap_err().message().contains("`tls` feature"));
    }

    #[cfg(feature = "tls")]
    #[test]
    fn test_tls_config_enabled() {
        let config = TlsConfigBuilder::new()
            .enabled(true)
            .ca_cert_path("/etc/ca.pem")
            .client_auth("/etc/client.pem", "/etc/client.key")
            .server_name("members.internal")
            .verify_hostname(false)
            .build()
            .unwrap();
        assert!(config.enabled());
        assert!(config.has_client_auth());
        assert_eq!(config.server_name(), Some("members.internal"));
        assert!(!config.verify_hostname());
    }

    #[test]
    fn test_statistics_config() {
        let config = ClientConfig::builder()
            .statistics(|s| s.enabled(true).period(Duration::from_secs(10)))
            .build()
            .unwrap();
        assert!(config.statistics().enabled());
        assert_eq!(config.statistics().period(), Duration::from_secs(10));

        assert!(StatisticsConfigBuilder::new()
            .period(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_fluent_sub_builder_api() {
        let config = ClientConfig::builder()
            .cluster_name("test-cluster")
            .client_name("orders-service")
            .network(|n| {
                n.add_address("192.168.1.1:5701")
                    .connection_timeout(Duration::from_secs(20))
                    .smart_routing(false)
                    .reconnect_mode(ReconnectMode::Off)
            })
            .retry(|r| r.connection_attempt_limit(3).multiplier(1.5))
            .security(|s| s.credentials("user", "pass"))
            .invocation_timeout(Duration::from_secs(15))
            .invocation_retry_count(2)
            .redo_operation(true)
            .max_concurrent_invocations(64)
            .build()
            .unwrap();

        assert_eq!(config.cluster_name(), "test-cluster");
        assert_eq!(config.client_name(), Some("orders-service"));
        assert_eq!(config.network().connection_timeout(), Duration::from_secs(20));
        assert!(!config.network().smart_routing());
        assert_eq!(config.network().reconnect_mode(), ReconnectMode::Off);
        assert_eq!(config.retry().connection_attempt_limit(), 3);
        assert!(config.security().has_credentials());
        assert_eq!(config.invocation_timeout(), Duration::from_secs(15));
        assert_eq!(config.invocation_retry_count(), 2);
        assert!(config.redo_operation());
        assert_eq!(config.max_concurrent_invocations(), 64);
    }

    #[test]
    fn test_zero_invocation_timeout_fails() {
        let result = ClientConfig::builder()
            .invocation_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_error_converts_to_grid_error() {
        let err: GridError = ConfigError::new("bad").into();
        assert!(matches!(err, GridError::Configuration(ref m) if m == "bad"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::new("test error");
        assert_eq!(err.to_string(), "configuration error: test error");
    }

    #[test]
    fn test_client_config_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientConfig>();
        assert_send_sync::<ConfigError>();
    }
}
