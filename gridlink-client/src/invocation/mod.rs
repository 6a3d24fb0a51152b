//! Invocation lifecycle: correlation, pending table, retry and timeout.

mod correlation;
mod pending;
mod retry;
mod service;
mod state;

use std::time::Duration;

use bytes::Bytes;
use gridlink_core::partition::PartitionAware;
use uuid::Uuid;

use crate::cluster::RoutingTarget;

pub use correlation::{CorrelationIdGenerator, FIRST_CORRELATION_ID};
pub use pending::{PendingInvocation, PendingRegistration, PendingTable, ResponseReceiver};
pub use retry::{calculate_backoff_with_jitter, Backoff};
pub use service::{InvocationService, InvocationSettings};
pub use state::InvocationState;

/// A request to be sent to the cluster.
///
/// # Example
///
/// ```
/// use gridlink_client::invocation::Invocation;
/// use std::time::Duration;
///
/// let invocation = Invocation::new(0x010100, b"payload".to_vec())
///     .for_key("customer-42")
///     .idempotent(true)
///     .with_timeout(Duration::from_secs(5));
/// assert!(invocation.is_idempotent());
/// ```
#[derive(Debug, Clone)]
pub struct Invocation {
    message_type: i32,
    payload: Bytes,
    target: RoutingTarget,
    idempotent: bool,
    timeout: Option<Duration>,
}

impl Invocation {
    /// Creates a non-idempotent invocation sent to any member.
    pub fn new(message_type: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
            target: RoutingTarget::Any,
            idempotent: false,
            timeout: None,
        }
    }

    /// Sets the routing target.
    pub fn with_target(mut self, target: RoutingTarget) -> Self {
        self.target = target;
        self
    }

    /// Routes to the owner of `key`'s partition.
    pub fn for_key<K: PartitionAware + ?Sized>(self, key: &K) -> Self {
        self.with_target(RoutingTarget::key(key))
    }

    /// Routes to the owner of `partition_id`.
    pub fn on_partition(self, partition_id: i32) -> Self {
        self.with_target(RoutingTarget::Partition(partition_id))
    }

    /// Routes to a specific member.
    pub fn on_member(self, member: Uuid) -> Self {
        self.with_target(RoutingTarget::Member(member))
    }

    /// Marks the operation safe to repeat after it may have reached a member.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Overrides the configured invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the message type.
    pub fn message_type(&self) -> i32 {
        self.message_type
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the routing target.
    pub fn target(&self) -> &RoutingTarget {
        &self.target
    }

    /// Returns true if the operation may be repeated freely.
    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    /// Returns the timeout override.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
