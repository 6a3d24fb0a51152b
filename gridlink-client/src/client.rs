//! gridlink client entry point.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use gridlink_core::protocol::messages::{cluster_view_listen_request, cluster_view_request};
use gridlink_core::protocol::{
    ClientMessage, ClusterView, CLIENT_PING_RESPONSE, CLUSTER_VIEW_EVENT, HEARTBEAT_CORRELATION_ID,
};
use gridlink_core::{GridError, Result};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

use crate::cluster::{MembershipService, MembershipView, PartitionRouter};
use crate::config::ClientConfig;
use crate::connection::{
    default_load_balancer, AddressResolver, CloudDiscovery, Connection, ConnectionEvent,
    ConnectionId, ConnectionRegistry, InboundEvent, StaticAddressDiscovery,
};
use crate::diagnostics::{log_statistics, spawn_reporter, ClientStatistics, StatisticsCollector};
use crate::invocation::{Backoff, Invocation, InvocationService, InvocationSettings};
use crate::listener::{LifecycleEvent, Member, MemberEvent};
use crate::reconnect::ReconnectionController;

/// Inbound frames buffered between connection readers and the dispatcher.
const INBOUND_QUEUE_CAPACITY: usize = 4096;

/// Time given to background tasks to stop before they are aborted.
const TASK_STOP_GRACE: Duration = Duration::from_secs(2);

/// The entry point for talking to a gridlink cluster.
///
/// `GridClient` owns every background task (connection I/O, heartbeat,
/// membership refresh, reconnection, statistics) and stops them in
/// [`shutdown`](Self::shutdown).
///
/// # Example
///
/// ```no_run
/// use gridlink_client::{ClientConfig, GridClient, Invocation};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder()
///         .cluster_name("dev")
///         .add_address("127.0.0.1:5701")
///         .build()?;
///
///     let client = GridClient::start(config).await?;
///     let response = client
///         .invoke(Invocation::new(0x010100, b"payload".to_vec()).for_key("customer-42"))
///         .await?;
///     println!("{} response bytes", response.payload().len());
///
///     client.shutdown().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct GridClient {
    inner: Arc<ClientInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    connection_events: Mutex<Option<broadcast::Receiver<ConnectionEvent>>>,
}

#[derive(Debug)]
struct ClientInner {
    config: Arc<ClientConfig>,
    client_uuid: Uuid,
    registry: Arc<ConnectionRegistry>,
    membership: Arc<MembershipService>,
    router: Arc<PartitionRouter>,
    invocations: Arc<InvocationService>,
    reconnect: Arc<ReconnectionController>,
    resolver: Arc<AddressResolver>,
    statistics: Arc<StatisticsCollector>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    shutdown_tx: watch::Sender<bool>,
    view_listener: std::sync::Mutex<Option<ConnectionId>>,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
    cluster_id: Mutex<Option<Uuid>>,
    connected: AtomicBool,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl GridClient {
    /// Creates a client and connects it to the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable or no member could
    /// be reached.
    pub async fn start(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.connect().await?;
        Ok(client)
    }

    /// Creates a client without connecting it.
    ///
    /// Subscribe to events here, then call [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Result<Self> {
        let config = Arc::new(config);
        let client_uuid = Uuid::new_v4();
        let statistics = Arc::new(StatisticsCollector::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (lifecycle, _) = broadcast::channel(16);

        let registry = Arc::new(ConnectionRegistry::new(
            &config,
            client_uuid,
            inbound_tx,
            Arc::clone(&statistics),
        ));
        let connection_events = registry.subscribe();
        let membership = Arc::new(MembershipService::new());
        let router = Arc::new(PartitionRouter::new(
            Arc::clone(&membership),
            Arc::clone(&registry),
            default_load_balancer(),
            config.network().smart_routing(),
        ));
        let invocations = Arc::new(InvocationService::new(
            Arc::clone(&router),
            Arc::clone(&registry),
            InvocationSettings::from_config(&config),
            Arc::clone(&statistics),
            shutdown_rx.clone(),
        ));
        let resolver = Arc::new(Self::address_resolver(&config));
        let reconnect = Arc::new(ReconnectionController::new(
            Arc::clone(&registry),
            Arc::clone(&membership),
            Arc::clone(&resolver),
            Arc::clone(&invocations),
            config.retry().clone(),
            config.network().reconnect_mode(),
            shutdown_rx,
        ));

        let inner = Arc::new(ClientInner {
            config,
            client_uuid,
            registry,
            membership,
            router,
            invocations,
            reconnect,
            resolver,
            statistics,
            lifecycle,
            shutdown_tx,
            view_listener: std::sync::Mutex::new(None),
            background: std::sync::Mutex::new(Vec::new()),
            cluster_id: Mutex::new(None),
            connected: AtomicBool::new(false),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        });

        Ok(Self {
            inner,
            tasks: Mutex::new(Vec::new()),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            connection_events: Mutex::new(Some(connection_events)),
        })
    }

    fn address_resolver(config: &ClientConfig) -> AddressResolver {
        if let Some(cloud) = config.network().cloud() {
            return AddressResolver::new(CloudDiscovery::new(cloud));
        }
        let addresses = config.network().addresses();
        if addresses.is_empty() {
            AddressResolver::new(StaticAddressDiscovery::default())
        } else {
            AddressResolver::new(StaticAddressDiscovery::new(addresses.iter()))
        }
    }

    /// Connects to the cluster and starts the background tasks.
    ///
    /// # Errors
    ///
    /// - `GridError::Configuration` if the client was already started.
    /// - The last connection error if no member could be reached within
    ///   `connection_attempt_limit` rounds.
    #[instrument(name = "client.connect", skip(self), fields(cluster = %self.inner.config.cluster_name(), client = %self.inner.client_uuid))]
    pub async fn connect(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(GridError::Configuration(
                "client was already started".to_string(),
            ));
        }
        self.inner.emit(LifecycleEvent::Starting);

        let inbound_rx = self.inbound_rx.lock().await.take();
        let connection_events = self.connection_events.lock().await.take();
        let (Some(inbound_rx), Some(connection_events)) = (inbound_rx, connection_events) else {
            return Err(GridError::Configuration(
                "client was already started".to_string(),
            ));
        };

        let mut tasks = self.tasks.lock().await;
        tasks.push(Arc::clone(&self.inner).spawn_dispatcher(inbound_rx));
        tasks.push(Arc::clone(&self.inner).spawn_connection_listener(connection_events));

        let bootstrapped = match self.inner.bootstrap().await {
            Ok(connection) => match self.inner.on_connected(&connection).await {
                Ok(()) => {
                    self.inner.ensure_view_listener(&connection).await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = bootstrapped {
            tracing::error!(error = %e, "could not connect to the cluster");
            drop(tasks);
            let _ = self.shutdown().await;
            return Err(e);
        }
        if let Err(e) = self.inner.refresh_view().await {
            tracing::debug!(error = %e, "initial membership view pull failed");
        }

        tasks.push(self.inner.registry.spawn_heartbeat(self.inner.shutdown_tx.subscribe()));
        tasks.push(Arc::clone(&self.inner).spawn_view_refresh());
        if self.inner.config.statistics().enabled() {
            let registry = Arc::clone(&self.inner.registry);
            tasks.push(spawn_reporter(
                Arc::clone(&self.inner.statistics),
                self.inner.config.statistics().period(),
                self.inner.shutdown_tx.subscribe(),
                move || registry.connection_count() as u64,
                |stats| log_statistics(&stats),
            ));
        }

        tracing::info!(
            members = self.inner.membership.members().len(),
            partition_count = self.inner.membership.partition_count(),
            "client started"
        );
        self.inner.emit(LifecycleEvent::Started);
        Ok(())
    }

    /// Sends an invocation and waits for its response.
    pub async fn invoke(&self, invocation: Invocation) -> Result<ClientMessage> {
        self.inner.invocations.invoke(invocation).await
    }

    /// Returns this client's UUID.
    pub fn client_uuid(&self) -> Uuid {
        self.inner.client_uuid
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the cluster name.
    pub fn cluster_name(&self) -> &str {
        self.inner.config.cluster_name()
    }

    /// Returns true while at least one connection is live.
    pub fn is_connected(&self) -> bool {
        self.inner.registry.has_connections()
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.registry.connection_count()
    }

    /// Returns the current cluster members.
    pub fn members(&self) -> Vec<Member> {
        self.inner.membership.members()
    }

    /// Returns the member with `uuid`.
    pub fn get_member(&self, uuid: &Uuid) -> Option<Member> {
        self.inner.membership.get_member(uuid)
    }

    /// Returns the current membership view.
    pub fn membership_view(&self) -> Arc<MembershipView> {
        self.inner.membership.current()
    }

    /// Returns the partition count used for routing.
    pub fn partition_count(&self) -> i32 {
        self.inner.router.partition_count()
    }

    /// Returns the partition `key` belongs to.
    pub fn partition_id(&self, key: &[u8]) -> i32 {
        self.inner.router.partition_id(key)
    }

    /// Returns the owner of `partition_id`.
    pub fn partition_owner(&self, partition_id: i32) -> Option<Member> {
        self.inner.membership.resolve_owner(partition_id)
    }

    /// Returns the members marked unreachable after repeated failed
    /// connection attempts.
    pub fn unreachable_members(&self) -> Vec<Uuid> {
        self.inner.registry.unreachable_members()
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle.subscribe()
    }

    /// Subscribes to member added/removed events.
    pub fn subscribe_members(&self) -> broadcast::Receiver<MemberEvent> {
        self.inner.membership.subscribe_members()
    }

    /// Subscribes to applied membership views.
    pub fn subscribe_views(&self) -> watch::Receiver<Arc<MembershipView>> {
        self.inner.membership.subscribe_views()
    }

    /// Subscribes to connection events.
    pub fn subscribe_connections(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.registry.subscribe()
    }

    /// Returns a statistics snapshot.
    pub fn statistics(&self) -> ClientStatistics {
        self.inner
            .statistics
            .collect(self.inner.registry.connection_count() as u64)
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Fails pending invocations, closes every connection and stops the
    /// background tasks.
    ///
    /// Calling this more than once is a no-op.
    #[instrument(name = "client.shutdown", skip(self), fields(client = %self.inner.client_uuid))]
    pub async fn shutdown(&self) -> Result<()> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.emit(LifecycleEvent::ShuttingDown);
        let _ = self.inner.shutdown_tx.send(true);

        self.inner.reconnect.shutdown().await;
        let failed = self.inner.invocations.fail_all("client is shutting down");
        if failed > 0 {
            tracing::debug!(failed, "failed pending invocations on shutdown");
        }
        self.inner.abort_background();
        self.inner.registry.close_all("client shutdown").await;

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for mut task in tasks {
            if tokio::time::timeout(TASK_STOP_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }

        if self.inner.connected.swap(false, Ordering::AcqRel) {
            self.inner.emit(LifecycleEvent::ClientDisconnected);
        }
        tracing::info!("client shut down");
        self.inner.emit(LifecycleEvent::Shutdown);
        Ok(())
    }
}

impl Drop for GridClient {
    fn drop(&mut self) {
        let _ = self.inner.shutdown_tx.send(true);
    }
}

impl ClientInner {
    fn emit(&self, event: LifecycleEvent) {
        tracing::debug!(event = %event, "lifecycle event");
        let _ = self.lifecycle.send(event);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Runs `task` in the background until it finishes or the client shuts
    /// down.
    fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        background.retain(|handle| !handle.is_finished());
        if self.is_shutting_down() {
            return;
        }
        background.push(tokio::spawn(task));
    }

    fn abort_background(&self) {
        let handles: Vec<_> = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
    }

    /// Registers the view listener on `connection` without blocking the
    /// caller.
    fn spawn_view_listener(self: &Arc<Self>, connection: Arc<Connection>) {
        let inner = Arc::clone(self);
        self.spawn_background(async move {
            inner.ensure_view_listener(&connection).await;
        });
    }

    /// Connects to the first reachable resolved address, retrying whole
    /// rounds with backoff.
    async fn bootstrap(&self) -> Result<Arc<Connection>> {
        let limit = self.config.retry().connection_attempt_limit();
        let mut backoff = Backoff::new(self.config.retry());
        let mut last_error = None;

        for round in 1..=limit {
            match self.resolver.resolve().await {
                Ok(addresses) => {
                    for address in addresses {
                        match self.registry.connect_to_address(address).await {
                            Ok(connection) => return Ok(connection),
                            Err(e) => {
                                tracing::warn!(address = %address, round, error = %e, "connection attempt failed");
                                if matches!(e, GridError::Authentication(_)) {
                                    return Err(e);
                                }
                                last_error = Some(e);
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(round, error = %e, "failed to resolve member addresses");
                    last_error = Some(e);
                }
            }

            if round < limit {
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GridError::Transport("no member address could be resolved".to_string())
        }))
    }

    /// Brings a newly registered connection into service.
    async fn on_connected(self: &Arc<Self>, connection: &Arc<Connection>) -> Result<()> {
        {
            let mut cluster_id = self.cluster_id.lock().await;
            if let Some(previous) = *cluster_id {
                if previous != connection.cluster_id() {
                    tracing::warn!(
                        previous = %previous,
                        current = %connection.cluster_id(),
                        "connected to a different cluster, resetting membership"
                    );
                    let change = self.membership.reset();
                    for member in change.removed {
                        self.member_left(member.uuid());
                    }
                }
            }
            *cluster_id = Some(connection.cluster_id());
        }

        if let Err(e) = self.membership.set_partition_count(connection.partition_count()) {
            tracing::error!(member = %connection.member_uuid(), error = %e, "rejecting member");
            self.registry
                .close_and_remove(&connection.member_uuid(), "partition count mismatch");
            return Err(e);
        }

        if !self.connected.swap(true, Ordering::AcqRel) {
            tracing::info!(member = %connection.member_uuid(), address = %connection.address(), "client connected");
            self.emit(LifecycleEvent::ClientConnected);
        }
        Ok(())
    }

    /// Registers for view pushes unless a live connection already carries
    /// the registration or has one in flight.
    async fn ensure_view_listener(&self, candidate: &Arc<Connection>) {
        {
            let mut listener = self.view_listener.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(id) = *listener {
                if self.registry.connections().iter().any(|c| c.id() == id) {
                    return;
                }
            }
            *listener = Some(candidate.id());
        }

        let timeout = self.config.invocation_timeout();
        match self
            .invocations
            .invoke_on(candidate, cluster_view_listen_request(), timeout)
            .await
        {
            Ok(_) => {
                tracing::debug!(id = %candidate.id(), member = %candidate.member_uuid(), "registered membership view listener");
            }
            Err(e) => {
                tracing::warn!(id = %candidate.id(), error = %e, "membership view listener registration failed");
                let mut listener = self.view_listener.lock().unwrap_or_else(PoisonError::into_inner);
                if *listener == Some(candidate.id()) {
                    *listener = None;
                }
            }
        }
    }

    /// Pulls the current view from any connection and applies it.
    async fn refresh_view(self: &Arc<Self>) -> Result<bool> {
        let connection = self.router.any_connection()?;
        let response = self
            .invocations
            .invoke_on(&connection, cluster_view_request(), self.config.invocation_timeout())
            .await?;
        let view = ClusterView::decode(&response)?;
        Ok(self.apply_view(view))
    }

    fn apply_view(self: &Arc<Self>, view: ClusterView) -> bool {
        let Some(change) = self.membership.apply(MembershipView::from(view)) else {
            return false;
        };

        for member in &change.removed {
            self.member_left(member.uuid());
        }

        if self.router.is_smart() && !self.is_shutting_down() {
            for member in change.added {
                if self.registry.get(&member.uuid()).is_some() {
                    continue;
                }
                let registry = Arc::clone(&self.registry);
                self.spawn_background(async move {
                    if let Err(e) = registry.get_or_connect(&member).await {
                        tracing::debug!(member = %member.uuid(), error = %e, "could not connect to new member");
                    }
                });
            }
        }
        true
    }

    fn member_left(&self, member: Uuid) {
        self.reconnect.member_removed(member);
        self.registry.close_and_remove(&member, "member left the cluster");
        self.invocations.member_lost(member, "member left the cluster");
    }

    fn spawn_dispatcher(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = inbound.recv() => match event {
                        Some(event) => self.dispatch(event),
                        None => break,
                    },
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("dispatcher stopped");
        })
    }

    fn dispatch(self: &Arc<Self>, event: InboundEvent) {
        match event {
            InboundEvent::Message {
                connection_id,
                message,
                ..
            } => {
                if message.is_event() {
                    self.handle_event(connection_id, message);
                } else if message.message_type() == CLIENT_PING_RESPONSE
                    && message.correlation_id() == HEARTBEAT_CORRELATION_ID
                {
                    tracing::trace!(connection = %connection_id, "heartbeat answered");
                } else {
                    self.invocations.handle_response(message);
                }
            }
            InboundEvent::Closed {
                connection_id,
                member_uuid,
                reason,
                ..
            } => {
                self.invocations.connection_closed(connection_id, &reason);
                self.registry
                    .remove_connection(connection_id, &member_uuid, &reason);
            }
        }
    }

    fn handle_event(self: &Arc<Self>, connection_id: ConnectionId, message: ClientMessage) {
        match message.message_type() {
            CLUSTER_VIEW_EVENT => match ClusterView::decode(&message) {
                Ok(view) => {
                    self.apply_view(view);
                }
                Err(e) => {
                    tracing::warn!(connection = %connection_id, error = %e, "malformed membership view event");
                }
            },
            other => {
                tracing::debug!(connection = %connection_id, message_type = other, "ignoring unknown event");
            }
        }
    }

    fn spawn_connection_listener(
        self: Arc<Self>,
        mut events: broadcast::Receiver<ConnectionEvent>,
    ) -> JoinHandle<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => self.handle_connection_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "connection events lagged, reconciling");
                            self.reconcile_connections();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn handle_connection_event(self: &Arc<Self>, event: ConnectionEvent) {
        if self.is_shutting_down() {
            return;
        }
        match event {
            ConnectionEvent::Connected { id, member_uuid, .. } => {
                let Some(connection) = self.registry.get(&member_uuid).filter(|c| c.id() == id) else {
                    return;
                };
                match self.on_connected(&connection).await {
                    Ok(()) => self.spawn_view_listener(connection),
                    Err(e) => tracing::warn!(id = %id, error = %e, "connection setup failed"),
                }
            }
            ConnectionEvent::Disconnected {
                id,
                member_uuid,
                reason,
                ..
            } => {
                self.invocations.connection_closed(id, &reason);

                let listener_lost = {
                    let mut listener = self.view_listener.lock().unwrap_or_else(PoisonError::into_inner);
                    if *listener == Some(id) {
                        *listener = None;
                        true
                    } else {
                        false
                    }
                };

                self.reconnect.connection_lost(member_uuid);

                if !self.registry.has_connections() {
                    if self.connected.swap(false, Ordering::AcqRel) {
                        tracing::warn!(reason = %reason, "client disconnected from the cluster");
                        self.emit(LifecycleEvent::ClientDisconnected);
                    }
                } else if listener_lost {
                    if let Some(connection) = self.registry.connections().into_iter().next() {
                        self.spawn_view_listener(connection);
                    }
                }
            }
        }
    }

    /// Rebuilds the state that dropped connection events would have updated.
    fn reconcile_connections(self: &Arc<Self>) {
        if self.is_shutting_down() {
            return;
        }
        for member in self.membership.members() {
            if self.registry.get(&member.uuid()).is_none() {
                self.reconnect.connection_lost(member.uuid());
            }
        }

        match self.registry.connections().into_iter().next() {
            Some(connection) => {
                let inner = Arc::clone(self);
                self.spawn_background(async move {
                    if inner.on_connected(&connection).await.is_ok() {
                        inner.ensure_view_listener(&connection).await;
                    }
                });
            }
            None => {
                if self.connected.swap(false, Ordering::AcqRel) {
                    tracing::warn!("client disconnected from the cluster");
                    self.emit(LifecycleEvent::ClientDisconnected);
                }
                self.reconnect.start_rejoin();
            }
        }
    }

    fn spawn_view_refresh(self: Arc<Self>) -> JoinHandle<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = self.config.network().membership_refresh_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.refresh_view().await {
                            Ok(true) => tracing::debug!(version = self.membership.version(), "membership view refreshed"),
                            Ok(false) => {}
                            Err(e) => tracing::debug!(error = %e, "membership view refresh failed"),
                        }
                    }
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            tracing::debug!("membership refresh task shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_connect() {
        let client = GridClient::new(ClientConfig::default()).unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.connection_count(), 0);
        assert!(client.members().is_empty());
        assert_eq!(client.cluster_name(), "dev");
        assert_eq!(client.partition_count(), 271);
        assert!(!client.is_shutdown());
    }

    #[tokio::test]
    async fn test_invoke_before_connect_is_offline() {
        let client = GridClient::new(ClientConfig::default()).unwrap();
        let err = client
            .invoke(Invocation::new(0x010100, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, GridError::ClientOffline(_)));
    }

    #[tokio::test]
    async fn test_start_fails_without_members() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::builder()
            .add_address(address)
            .connection_timeout(Duration::from_millis(200))
            .retry(|r| {
                r.initial_backoff(Duration::from_millis(10))
                    .max_backoff(Duration::from_millis(20))
                    .connection_attempt_limit(2)
            })
            .build()
            .unwrap();

        let client = GridClient::new(config).unwrap();
        let mut lifecycle = client.subscribe_lifecycle();
        let err = client.connect().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(client.is_shutdown());

        assert_eq!(lifecycle.recv().await.unwrap(), LifecycleEvent::Starting);
        assert_eq!(lifecycle.recv().await.unwrap(), LifecycleEvent::ShuttingDown);
        assert_eq!(lifecycle.recv().await.unwrap(), LifecycleEvent::Shutdown);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let client = GridClient::new(ClientConfig::default()).unwrap();
        client.shutdown().await.unwrap();
        client.shutdown().await.unwrap();
        assert!(client.is_shutdown());
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GridClient>();
    }
}
