//! Versioned membership view and partition table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use gridlink_core::protocol::ClusterView;
use gridlink_core::{GridError, Result};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::listener::{Member, MemberEvent};

/// Version of the view in place before the first update.
pub const INITIAL_VIEW_VERSION: i64 = -1;

/// An immutable snapshot of cluster members and partition ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipView {
    version: i64,
    members: Vec<Member>,
    index: HashMap<Uuid, usize>,
    partition_table: Vec<Option<Uuid>>,
}

impl MembershipView {
    /// Returns the empty view held before the first update.
    pub fn empty() -> Self {
        Self {
            version: INITIAL_VIEW_VERSION,
            members: Vec::new(),
            index: HashMap::new(),
            partition_table: Vec::new(),
        }
    }

    /// Creates a view from its parts.
    pub fn new(version: i64, members: Vec<Member>, partition_table: Vec<Option<Uuid>>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(i, member)| (member.uuid(), i))
            .collect();
        Self {
            version,
            members,
            index,
            partition_table,
        }
    }

    /// Returns the view version.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the members in cluster order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Returns the member with `uuid`.
    pub fn member(&self, uuid: &Uuid) -> Option<&Member> {
        self.index.get(uuid).map(|&i| &self.members[i])
    }

    /// Returns true if `uuid` is a member in this view.
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.index.contains_key(uuid)
    }

    /// Returns the owner slot of every partition.
    pub fn partition_table(&self) -> &[Option<Uuid>] {
        &self.partition_table
    }

    /// Returns the owner of `partition_id`, if assigned and still a member.
    pub fn owner(&self, partition_id: i32) -> Option<&Member> {
        let slot = usize::try_from(partition_id).ok()?;
        let owner = self.partition_table.get(slot).copied().flatten()?;
        self.member(&owner)
    }
}

impl From<ClusterView> for MembershipView {
    fn from(view: ClusterView) -> Self {
        let members = view.members.into_iter().map(Member::from).collect();
        Self::new(view.version, members, view.partition_owners)
    }
}

impl Default for MembershipView {
    fn default() -> Self {
        Self::empty()
    }
}

/// Members added and removed by an applied view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    /// Members present in the new view only.
    pub added: Vec<Member>,
    /// Members present in the previous view only.
    pub removed: Vec<Member>,
}

impl MembershipChange {
    fn between(previous: &MembershipView, next: &MembershipView) -> Self {
        let added = next
            .members()
            .iter()
            .filter(|member| !previous.contains(&member.uuid()))
            .cloned()
            .collect();
        let removed = previous
            .members()
            .iter()
            .filter(|member| !next.contains(&member.uuid()))
            .cloned()
            .collect();
        Self { added, removed }
    }

    /// Returns true if no member joined or left.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Holds the current [`MembershipView`] and publishes every applied snapshot.
///
/// Readers clone an `Arc` of the current view, so a lookup never observes a
/// partially replaced table.
#[derive(Debug)]
pub struct MembershipService {
    view_tx: watch::Sender<Arc<MembershipView>>,
    member_events: broadcast::Sender<MemberEvent>,
    partition_count: AtomicI32,
}

impl MembershipService {
    /// Creates a service holding the empty view.
    pub fn new() -> Self {
        let (view_tx, _) = watch::channel(Arc::new(MembershipView::empty()));
        let (member_events, _) = broadcast::channel(256);
        Self {
            view_tx,
            member_events,
            partition_count: AtomicI32::new(0),
        }
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Arc<MembershipView> {
        Arc::clone(&self.view_tx.borrow())
    }

    /// Returns the current view version.
    pub fn version(&self) -> i64 {
        self.view_tx.borrow().version()
    }

    /// Subscribes to applied snapshots.
    pub fn subscribe_views(&self) -> watch::Receiver<Arc<MembershipView>> {
        self.view_tx.subscribe()
    }

    /// Subscribes to member added/removed events.
    pub fn subscribe_members(&self) -> broadcast::Receiver<MemberEvent> {
        self.member_events.subscribe()
    }

    /// Returns the cluster partition count, or 0 before the first handshake.
    pub fn partition_count(&self) -> i32 {
        self.partition_count.load(Ordering::Acquire)
    }

    /// Records the partition count announced in a handshake.
    ///
    /// # Errors
    ///
    /// Returns `GridError::Topology` if a different count was already announced.
    pub fn set_partition_count(&self, count: i32) -> Result<()> {
        if count <= 0 {
            return Err(GridError::Protocol(format!(
                "member announced invalid partition count {}",
                count
            )));
        }
        match self
            .partition_count
            .compare_exchange(0, count, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(existing) if existing == count => Ok(()),
            Err(existing) => Err(GridError::Topology(format!(
                "member announced {} partitions but the cluster has {}",
                count, existing
            ))),
        }
    }

    /// Applies `view` if it is newer than the current one and its partition
    /// table matches the cluster partition count.
    ///
    /// Returns true if the view was applied.
    pub fn update(&self, view: MembershipView) -> bool {
        self.apply(view).is_some()
    }

    /// Like [`update`](Self::update), returning the member changes of an
    /// applied view.
    pub fn apply(&self, view: MembershipView) -> Option<MembershipChange> {
        let partition_count = self.partition_count();
        if partition_count > 0 && view.partition_table.len() != partition_count as usize {
            tracing::warn!(
                version = view.version(),
                table_len = view.partition_table.len(),
                partition_count,
                "dropping membership view with mismatched partition table"
            );
            return None;
        }

        let mut change = None;
        let next = Arc::new(view);
        self.view_tx.send_if_modified(|current| {
            if next.version() <= current.version() {
                return false;
            }
            change = Some(MembershipChange::between(current, &next));
            *current = Arc::clone(&next);
            true
        });

        let Some(change) = change else {
            tracing::debug!(version = next.version(), "dropping stale membership view");
            return None;
        };

        tracing::debug!(
            version = next.version(),
            members = next.members().len(),
            "membership view applied"
        );
        self.publish(&change);
        Some(change)
    }

    /// Replaces the view with the empty one and forgets the partition count.
    ///
    /// Used when the client rejoins a cluster from scratch; every known member
    /// is reported as removed.
    pub fn reset(&self) -> MembershipChange {
        let previous = self.view_tx.send_replace(Arc::new(MembershipView::empty()));
        self.partition_count.store(0, Ordering::Release);
        let change = MembershipChange {
            added: Vec::new(),
            removed: previous.members().to_vec(),
        };
        self.publish(&change);
        change
    }

    fn publish(&self, change: &MembershipChange) {
        for member in &change.removed {
            tracing::info!(member = %member.uuid(), address = %member.address(), "member removed");
            let _ = self.member_events.send(MemberEvent::member_removed(member.clone()));
        }
        for member in &change.added {
            tracing::info!(member = %member.uuid(), address = %member.address(), "member added");
            let _ = self.member_events.send(MemberEvent::member_added(member.clone()));
        }
    }

    /// Returns the owner of `partition_id` in the current view.
    pub fn resolve_owner(&self, partition_id: i32) -> Option<Member> {
        self.view_tx.borrow().owner(partition_id).cloned()
    }

    /// Returns the current members.
    pub fn members(&self) -> Vec<Member> {
        self.view_tx.borrow().members().to_vec()
    }

    /// Returns the member with `uuid` in the current view.
    pub fn get_member(&self, uuid: &Uuid) -> Option<Member> {
        self.view_tx.borrow().member(uuid).cloned()
    }

    /// Returns true if `uuid` is a member in the current view.
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.view_tx.borrow().contains(uuid)
    }
}

impl Default for MembershipService {
    fn default() -> Self {
        Self::new()
    }
}
