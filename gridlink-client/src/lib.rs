//! Async client connectivity for partitioned in-memory data grids.
//!
//! `gridlink-client` keeps a client attached to a cluster of members that
//! split a fixed set of partitions between them. It discovers members,
//! keeps one authenticated connection per member, tracks the cluster's
//! membership view and partition table, and routes each request to the
//! member that owns its data. Responses are matched to requests by
//! correlation id, failed attempts are retried under a bounded policy, and
//! lost connections are repaired in the background.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gridlink_client::{ClientConfig, GridClient, Invocation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .cluster_name("dev")
//!         .add_address("127.0.0.1:5701")
//!         .build()?;
//!     let client = GridClient::start(config).await?;
//!
//!     // Routed to the member owning the key's partition.
//!     let response = client
//!         .invoke(Invocation::new(0x010100, b"value".to_vec()).for_key("orders:42"))
//!         .await?;
//!     println!("{} bytes", response.payload().len());
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Components
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | [`AddressResolver`] | [`connection`] | Turns static addresses or cloud discovery into candidate socket addresses |
//! | [`ConnectionRegistry`] | [`connection`] | One live connection per member, heartbeats, unreachable marks |
//! | [`MembershipService`] | [`cluster`] | Versioned membership view and partition table |
//! | [`PartitionRouter`] | [`cluster`] | Maps keys, partitions and members to connections |
//! | [`InvocationService`] | [`invocation`] | Correlation ids, pending table, retries and deadlines |
//! | [`ReconnectionController`] | [`reconnect`] | Background repair of lost members and cluster rejoin |
//!
//! # Configuration
//!
//! ```rust,no_run
//! use gridlink_client::{ClientConfig, ReconnectMode};
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .cluster_name("production")
//!     .add_address("10.0.0.1:5701")
//!     .add_address("10.0.0.2:5701")
//!     .connection_timeout(Duration::from_secs(10))
//!     .invocation_timeout(Duration::from_secs(30))
//!     .credentials("admin", "secret")
//!     .network(|n| n.reconnect_mode(ReconnectMode::On).smart_routing(true))
//!     .retry(|r| r
//!         .initial_backoff(Duration::from_millis(100))
//!         .max_backoff(Duration::from_secs(30))
//!         .multiplier(2.0)
//!         .connection_attempt_limit(10))
//!     .build()
//!     .expect("invalid config");
//! ```
//!
//! Configuration can also be read from the environment with
//! [`ClientConfig::from_env`], or from YAML and TOML files with the
//! `config-file` feature.
//!
//! # Events
//!
//! ```rust,no_run
//! # use gridlink_client::{ClientConfig, GridClient};
//! # async fn example(client: GridClient) {
//! let mut members = client.subscribe_members();
//! tokio::spawn(async move {
//!     while let Ok(event) = members.recv().await {
//!         println!("{}", event);
//!     }
//! });
//! # }
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tls` | TLS connections via `tokio-rustls` |
//! | `cloud` | Cloud coordinator discovery via `reqwest` |
//! | `config-file` | YAML and TOML configuration files |
//!
//! # Logging
//!
//! The client logs through [`tracing`]. Install any subscriber, for example
//! `tracing_subscriber::fmt().init()`, to see connection, membership and
//! invocation events.

#![warn(missing_docs)]

mod client;
pub mod cluster;
pub mod config;
pub mod config_file;
pub mod connection;
pub mod diagnostics;
pub mod invocation;
pub mod listener;
pub mod reconnect;

pub use client::GridClient;
pub use cluster::{
    MembershipChange, MembershipService, MembershipView, PartitionRouter, Route, RoutingTarget,
};
pub use config::{
    ClientConfig, ClientConfigBuilder, CloudConfig, ConfigError, NetworkConfig,
    NetworkConfigBuilder, ReconnectMode, RetryConfig, RetryConfigBuilder, SecurityConfig,
    SecurityConfigBuilder, StatisticsConfig, StatisticsConfigBuilder, TlsConfig,
    TlsConfigBuilder,
};
pub use connection::{
    AddressResolver, ClusterDiscovery, Connection, ConnectionEvent, ConnectionId,
    ConnectionRegistry, LoadBalancer, StaticAddressDiscovery,
};
pub use diagnostics::{ClientStatistics, StatisticsCollector};
pub use gridlink_core as core;
pub use gridlink_core::{GridError, Result};
pub use invocation::{Invocation, InvocationService, InvocationState};
pub use listener::{LifecycleEvent, Member, MemberEvent, MemberEventType};
pub use reconnect::ReconnectionController;
