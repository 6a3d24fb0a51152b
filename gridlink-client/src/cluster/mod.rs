//! Cluster state: the membership view and partition routing.

mod membership;
mod router;

pub use membership::{MembershipChange, MembershipService, MembershipView, INITIAL_VIEW_VERSION};
pub use router::{PartitionRouter, Route, RoutingTarget};
