//! Routes invocations to the member that owns their data.

use std::sync::Arc;

use bytes::Bytes;
use gridlink_core::partition::{partition_id_for, PartitionAware, DEFAULT_PARTITION_COUNT};
use gridlink_core::protocol::PARTITION_ID_ANY;
use gridlink_core::{GridError, Result};
use uuid::Uuid;

use super::membership::MembershipService;
use crate::connection::{select, Connection, ConnectionRegistry, LoadBalancer};
use crate::listener::Member;

/// Where an invocation should be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum RoutingTarget {
    /// The owner of a partition.
    Partition(i32),
    /// The owner of the partition the key bytes hash to.
    Key(Bytes),
    /// A specific member.
    Member(Uuid),
    /// Any connected member.
    #[default]
    Any,
}

impl RoutingTarget {
    /// Targets the owner of `key`'s partition.
    pub fn key<K: PartitionAware + ?Sized>(key: &K) -> Self {
        RoutingTarget::Key(Bytes::from(key.partition_key_bytes()))
    }
}

/// A resolved routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Partition stamped on the request frame, `-1` if none.
    pub partition_id: i32,
    /// Member to send to; `None` means any connected member.
    pub member: Option<Member>,
}

/// Maps routing targets to members and connections.
#[derive(Debug)]
pub struct PartitionRouter {
    membership: Arc<MembershipService>,
    registry: Arc<ConnectionRegistry>,
    load_balancer: Arc<dyn LoadBalancer>,
    smart_routing: bool,
}

impl PartitionRouter {
    /// Creates a router.
    ///
    /// With `smart_routing` disabled every target is served by any connected
    /// member.
    pub fn new(
        membership: Arc<MembershipService>,
        registry: Arc<ConnectionRegistry>,
        load_balancer: Arc<dyn LoadBalancer>,
        smart_routing: bool,
    ) -> Self {
        Self {
            membership,
            registry,
            load_balancer,
            smart_routing,
        }
    }

    /// Returns true if requests go straight to partition owners.
    pub fn is_smart(&self) -> bool {
        self.smart_routing
    }

    /// Returns the partition count used for hashing.
    pub fn partition_count(&self) -> i32 {
        match self.membership.partition_count() {
            0 => DEFAULT_PARTITION_COUNT,
            count => count,
        }
    }

    /// Returns the partition `key` belongs to.
    pub fn partition_id(&self, key: &[u8]) -> i32 {
        partition_id_for(key, self.partition_count())
    }

    /// Resolves `target` against the current membership view.
    ///
    /// # Errors
    ///
    /// - `GridError::Topology` if the partition owner or member is unknown.
    /// - `GridError::Protocol` if the partition id is out of range.
    pub fn resolve(&self, target: &RoutingTarget) -> Result<Route> {
        let partition_id = match target {
            RoutingTarget::Partition(id) => {
                let count = self.partition_count();
                if !(0..count).contains(id) {
                    return Err(GridError::Protocol(format!(
                        "partition id {} is outside 0..{}",
                        id, count
                    )));
                }
                *id
            }
            RoutingTarget::Key(key) => self.partition_id(key),
            RoutingTarget::Member(_) | RoutingTarget::Any => PARTITION_ID_ANY,
        };

        if !self.smart_routing {
            return Ok(Route {
                partition_id,
                member: None,
            });
        }

        let member = match target {
            RoutingTarget::Partition(_) | RoutingTarget::Key(_) => Some(
                self.membership.resolve_owner(partition_id).ok_or_else(|| {
                    GridError::Topology(format!("owner of partition {} is unknown", partition_id))
                })?,
            ),
            RoutingTarget::Member(uuid) => Some(self.membership.get_member(uuid).ok_or_else(|| {
                GridError::Topology(format!("member {} is not in the cluster", uuid))
            })?),
            RoutingTarget::Any => None,
        };

        Ok(Route {
            partition_id,
            member,
        })
    }

    /// Returns a connection able to serve `route`, opening one if needed.
    pub async fn connection_for(&self, route: &Route) -> Result<Arc<Connection>> {
        match &route.member {
            Some(member) => self.registry.get_or_connect(member).await,
            None => self.any_connection(),
        }
    }

    /// Picks a live connection with the load balancer.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ClientOffline` if no connection is live.
    pub fn any_connection(&self) -> Result<Arc<Connection>> {
        let connections = self.registry.connections();
        select(self.load_balancer.as_ref(), &connections)
            .cloned()
            .ok_or_else(|| GridError::ClientOffline("no live connection to the cluster".to_string()))
    }
}
