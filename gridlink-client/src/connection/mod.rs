//! Connection management: address resolution, member connections and the
//! connection registry.

mod cloud;
mod connection;
mod discovery;
mod load_balancer;
mod registry;

#[cfg(feature = "tls")]
mod tls;

pub use cloud::{CloudDiscovery, CloudMemberAddress};
pub use connection::{Connection, ConnectionId, ConnectionSettings, InboundEvent};
pub use discovery::{
    resolve_address, split_host_port, AddressResolver, ClusterDiscovery, StaticAddressDiscovery,
    DEFAULT_MEMBER_PORT,
};
pub use load_balancer::{
    default_load_balancer, select, LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer,
};
pub use registry::{ConnectionEvent, ConnectionRegistry};
