//! Background repair of lost connections.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cluster::MembershipService;
use crate::config::{ReconnectMode, RetryConfig};
use crate::connection::{AddressResolver, ConnectionRegistry};
use crate::invocation::{Backoff, InvocationService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RepairTarget {
    Member(Uuid),
    Cluster,
}

/// Reconnects to members whose connection was lost, and to the cluster after
/// every connection was lost.
///
/// A member that keeps refusing connections is marked unreachable after
/// `connection_attempt_limit` consecutive failures. Repair continues in the
/// background at the maximum backoff until the member answers or leaves the
/// membership view.
#[derive(Debug)]
pub struct ReconnectionController {
    registry: Arc<ConnectionRegistry>,
    membership: Arc<MembershipService>,
    resolver: Arc<AddressResolver>,
    invocations: Arc<InvocationService>,
    retry: RetryConfig,
    mode: ReconnectMode,
    workers: DashMap<RepairTarget, JoinHandle<()>>,
    shutdown: watch::Receiver<bool>,
}

impl ReconnectionController {
    /// Creates a controller.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        membership: Arc<MembershipService>,
        resolver: Arc<AddressResolver>,
        invocations: Arc<InvocationService>,
        retry: RetryConfig,
        mode: ReconnectMode,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            membership,
            resolver,
            invocations,
            retry,
            mode,
            workers: DashMap::new(),
            shutdown,
        }
    }

    /// Returns the configured reconnect mode.
    pub fn mode(&self) -> ReconnectMode {
        self.mode
    }

    /// Returns true while a repair task for `member` runs.
    pub fn is_repairing(&self, member: &Uuid) -> bool {
        self.is_running(&RepairTarget::Member(*member))
    }

    /// Returns true while the client is reconnecting to the cluster.
    pub fn is_rejoining(&self) -> bool {
        self.is_running(&RepairTarget::Cluster)
    }

    fn is_running(&self, target: &RepairTarget) -> bool {
        self.workers
            .get(target)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Reacts to the loss of the connection to `member`.
    pub fn connection_lost(self: &Arc<Self>, member: Uuid) {
        if !self.mode.is_enabled() || *self.shutdown.borrow() {
            return;
        }

        if !self.registry.has_connections() {
            self.start_rejoin();
        }

        if self.membership.contains(&member) {
            self.spawn_worker(RepairTarget::Member(member));
        }
    }

    /// Stops repairing `member` and clears its unreachable mark.
    pub fn member_removed(&self, member: Uuid) {
        if let Some((_, handle)) = self.workers.remove(&RepairTarget::Member(member)) {
            handle.abort();
            tracing::debug!(member = %member, "stopped reconnecting to departed member");
        }
        self.registry.clear_unreachable(&member);
    }

    /// Starts reconnecting to the cluster from the address resolver.
    pub fn start_rejoin(self: &Arc<Self>) {
        if !self.mode.is_enabled() || *self.shutdown.borrow() {
            return;
        }
        self.spawn_worker(RepairTarget::Cluster);
    }

    fn spawn_worker(self: &Arc<Self>, target: RepairTarget) {
        match self.workers.entry(target) {
            Entry::Occupied(mut running) => {
                if running.get().is_finished() {
                    running.insert(self.spawn(target));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(self.spawn(target));
            }
        }
    }

    fn spawn(self: &Arc<Self>, target: RepairTarget) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            match target {
                RepairTarget::Member(member) => controller.repair_member(member).await,
                RepairTarget::Cluster => controller.rejoin().await,
            }
        })
    }

    async fn repair_member(&self, member_uuid: Uuid) {
        let mut backoff = Backoff::new(&self.retry);
        let mut shutdown = self.shutdown.clone();
        let mut failures = 0u32;

        loop {
            if *shutdown.borrow() {
                return;
            }
            let Some(member) = self.membership.get_member(&member_uuid) else {
                self.registry.clear_unreachable(&member_uuid);
                tracing::debug!(member = %member_uuid, "member left, giving up reconnect");
                return;
            };
            if self.registry.get(&member_uuid).is_some() {
                return;
            }

            match self.registry.connect_member(&member).await {
                Ok(connection) => {
                    tracing::info!(
                        member = %member_uuid,
                        address = %member.address(),
                        id = %connection.id(),
                        attempts = failures + 1,
                        "reconnected to member"
                    );
                    return;
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        member = %member_uuid,
                        address = %member.address(),
                        attempt = failures,
                        error = %e,
                        "reconnect attempt failed"
                    );
                    if failures == self.retry.connection_attempt_limit() {
                        self.registry.mark_unreachable(member_uuid);
                        let failed = self.invocations.member_lost(member_uuid, "member is unreachable");
                        tracing::error!(
                            member = %member_uuid,
                            failed_invocations = failed,
                            "member unreachable after {} attempts",
                            failures
                        );
                    }
                }
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn rejoin(&self) {
        let mut backoff = Backoff::new(&self.retry);
        let mut shutdown = self.shutdown.clone();
        let mut round = 0u32;
        tracing::warn!("lost every connection to the cluster, rejoining");

        loop {
            if *shutdown.borrow() || self.registry.has_connections() {
                return;
            }
            round += 1;

            match self.resolver.resolve().await {
                Ok(addresses) => {
                    for address in addresses {
                        match self.registry.connect_to_address(address).await {
                            Ok(connection) => {
                                tracing::info!(
                                    address = %address,
                                    member = %connection.member_uuid(),
                                    round,
                                    "rejoined cluster"
                                );
                                return;
                            }
                            Err(e) => {
                                tracing::warn!(address = %address, round, error = %e, "rejoin attempt failed");
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!(round, error = %e, "failed to resolve member addresses"),
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Stops every repair task.
    pub async fn shutdown(&self) {
        let targets: Vec<RepairTarget> = self.workers.iter().map(|entry| *entry.key()).collect();
        for target in targets {
            if let Some((_, handle)) = self.workers.remove(&target) {
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MembershipView, PartitionRouter};
    use crate::config::{ClientConfig, RetryConfigBuilder};
    use crate::connection::{RoundRobinLoadBalancer, StaticAddressDiscovery};
    use crate::diagnostics::StatisticsCollector;
    use crate::invocation::InvocationSettings;
    use crate::listener::Member;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    struct Fixture {
        controller: Arc<ReconnectionController>,
        registry: Arc<ConnectionRegistry>,
        membership: Arc<MembershipService>,
        _shutdown: watch::Sender<bool>,
    }

    fn fixture(mode: ReconnectMode, addresses: Vec<SocketAddr>) -> Fixture {
        let config = ClientConfig::builder()
            .network(|n| n.connection_timeout(Duration::from_millis(200)))
            .build()
            .unwrap();
        let retry = RetryConfigBuilder::new()
            .initial_backoff(Duration::from_millis(10))
            .max_backoff(Duration::from_millis(20))
            .jitter(0.0)
            .connection_attempt_limit(3)
            .build()
            .unwrap();
        let statistics = Arc::new(StatisticsCollector::new());
        let (inbound_tx, _) = mpsc::channel(16);
        let registry = Arc::new(ConnectionRegistry::new(
            &config,
            Uuid::new_v4(),
            inbound_tx,
            Arc::clone(&statistics),
        ));
        let membership = Arc::new(MembershipService::new());
        let router = Arc::new(PartitionRouter::new(
            Arc::clone(&membership),
            Arc::clone(&registry),
            Arc::new(RoundRobinLoadBalancer::new()),
            true,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let invocations = Arc::new(InvocationService::new(
            router,
            Arc::clone(&registry),
            InvocationSettings::from_config(&config),
            statistics,
            shutdown_rx.clone(),
        ));
        let resolver = Arc::new(AddressResolver::new(StaticAddressDiscovery::new(
            addresses.iter().map(|a| a.to_string()),
        )));
        let controller = Arc::new(ReconnectionController::new(
            Arc::clone(&registry),
            Arc::clone(&membership),
            resolver,
            invocations,
            retry,
            mode,
            shutdown_rx,
        ));
        Fixture {
            controller,
            registry,
            membership,
            _shutdown: shutdown_tx,
        }
    }

    async fn closed_address() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        address
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_unreachable_after_attempt_limit() {
        let address = closed_address().await;
        let fixture = fixture(ReconnectMode::On, vec![address]);
        let member = Member::new(Uuid::new_v4(), address);
        fixture
            .membership
            .update(MembershipView::new(1, vec![member.clone()], Vec::new()));

        fixture.controller.connection_lost(member.uuid());
        assert!(fixture.controller.is_repairing(&member.uuid()));

        let registry = Arc::clone(&fixture.registry);
        assert!(wait_for(|| registry.is_unreachable(&member.uuid())).await);
        assert!(fixture.controller.is_repairing(&member.uuid()));

        fixture
            .membership
            .update(MembershipView::new(2, Vec::new(), Vec::new()));
        fixture.controller.member_removed(member.uuid());
        assert!(!fixture.registry.is_unreachable(&member.uuid()));
        assert!(!fixture.controller.is_repairing(&member.uuid()));

        fixture.controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_member_outside_view_is_not_repaired() {
        let address = closed_address().await;
        let fixture = fixture(ReconnectMode::On, vec![address]);
        let stranger = Uuid::new_v4();

        fixture.controller.connection_lost(stranger);
        assert!(!fixture.controller.is_repairing(&stranger));
        assert!(fixture.controller.is_rejoining());

        fixture.controller.shutdown().await;
        assert!(!fixture.controller.is_rejoining());
    }

    #[tokio::test]
    async fn test_reconnect_off_does_nothing() {
        let address = closed_address().await;
        let fixture = fixture(ReconnectMode::Off, vec![address]);
        let member = Member::new(Uuid::new_v4(), address);
        fixture
            .membership
            .update(MembershipView::new(1, vec![member.clone()], Vec::new()));

        fixture.controller.connection_lost(member.uuid());
        fixture.controller.start_rejoin();
        assert!(!fixture.controller.is_repairing(&member.uuid()));
        assert!(!fixture.controller.is_rejoining());
        assert_eq!(fixture.controller.mode(), ReconnectMode::Off);
    }

    #[test]
    fn test_controller_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReconnectionController>();
    }
}
