//! Table of invocations awaiting a response.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gridlink_core::protocol::ClientMessage;
use gridlink_core::{GridError, Result};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::correlation::CorrelationIdGenerator;
use crate::connection::ConnectionId;

/// Receives the outcome of a pending invocation.
pub type ResponseReceiver = oneshot::Receiver<Result<ClientMessage>>;

/// A registered invocation awaiting its response.
#[derive(Debug)]
pub struct PendingInvocation {
    correlation_id: i64,
    target: Option<Uuid>,
    connection_id: ConnectionId,
    attempt: u32,
    deadline: Instant,
    sender: oneshot::Sender<Result<ClientMessage>>,
}

impl PendingInvocation {
    /// Returns the correlation id.
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }

    /// Returns the member the invocation was routed to, if routed to one.
    pub fn target(&self) -> Option<Uuid> {
        self.target
    }

    /// Returns the connection the request was written to.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns the attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the invocation deadline.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn resolve(self, outcome: Result<ClientMessage>) {
        // The caller may already be gone after its deadline.
        let _ = self.sender.send(outcome);
    }
}

/// Details of an attempt being registered.
#[derive(Debug, Clone, Copy)]
pub struct PendingRegistration {
    /// Member the request is routed to.
    pub target: Option<Uuid>,
    /// Connection the request will be written to.
    pub connection_id: ConnectionId,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// Invocation deadline.
    pub deadline: Instant,
}

/// Pending invocations keyed by correlation id.
///
/// Removing a record is the only way to reach its result slot, so each record
/// is resolved at most once no matter which path (response, closure, deadline)
/// gets there first.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: DashMap<i64, PendingInvocation>,
}

impl PendingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attempt under a fresh correlation id.
    ///
    /// Ids still present in the table are skipped.
    pub fn register(
        &self,
        ids: &CorrelationIdGenerator,
        registration: PendingRegistration,
    ) -> (i64, ResponseReceiver) {
        let (sender, receiver) = oneshot::channel();
        loop {
            let correlation_id = ids.next_id();
            match self.entries.entry(correlation_id) {
                Entry::Occupied(_) => {
                    tracing::debug!(correlation_id, "correlation id still in flight, skipping");
                }
                Entry::Vacant(slot) => {
                    slot.insert(PendingInvocation {
                        correlation_id,
                        target: registration.target,
                        connection_id: registration.connection_id,
                        attempt: registration.attempt,
                        deadline: registration.deadline,
                        sender,
                    });
                    return (correlation_id, receiver);
                }
            }
        }
    }

    /// Resolves the record for `correlation_id` with `outcome`.
    ///
    /// Returns false if no such record exists, e.g. after its deadline.
    pub fn complete(&self, correlation_id: i64, outcome: Result<ClientMessage>) -> bool {
        match self.entries.remove(&correlation_id) {
            Some((_, pending)) => {
                pending.resolve(outcome);
                true
            }
            None => false,
        }
    }

    /// Removes the record without resolving it.
    pub fn remove(&self, correlation_id: i64) -> Option<PendingInvocation> {
        self.entries.remove(&correlation_id).map(|(_, pending)| pending)
    }

    /// Fails every record written to `connection_id`.
    ///
    /// Returns the number of records failed.
    pub fn fail_connection(&self, connection_id: ConnectionId, reason: &str) -> usize {
        self.fail_where(
            |pending| pending.connection_id == connection_id,
            || GridError::Transport(format!("{} closed: {}", connection_id, reason)),
        )
    }

    /// Fails every record routed to `member`.
    pub fn fail_member(&self, member: Uuid, reason: &str) -> usize {
        self.fail_where(
            |pending| pending.target == Some(member),
            || GridError::Transport(format!("member {}: {}", member, reason)),
        )
    }

    /// Fails every record with the error built by `error`.
    pub fn fail_all<F>(&self, error: F) -> usize
    where
        F: Fn() -> GridError,
    {
        self.fail_where(|_| true, error)
    }

    fn fail_where<P, F>(&self, predicate: P, error: F) -> usize
    where
        P: Fn(&PendingInvocation) -> bool,
        F: Fn() -> GridError,
    {
        let ids: Vec<i64> = self
            .entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        ids.into_iter()
            .filter(|id| self.complete(*id, Err(error())))
            .count()
    }

    /// Returns true if `correlation_id` is in flight.
    pub fn contains(&self, correlation_id: i64) -> bool {
        self.entries.contains_key(&correlation_id)
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes a record from the table when dropped.
///
/// Held by the waiting caller so that a deadline or a dropped future clears
/// its record.
#[derive(Debug)]
pub(crate) struct PendingGuard {
    table: Arc<PendingTable>,
    correlation_id: i64,
}

impl PendingGuard {
    pub(crate) fn new(table: Arc<PendingTable>, correlation_id: i64) -> Self {
        Self {
            table,
            correlation_id,
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(self.correlation_id);
    }
}
