//! Registry of live member connections.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use gridlink_core::protocol::messages::ping_request;
use gridlink_core::{GridError, Result};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::instrument;
use uuid::Uuid;

use super::connection::{Connection, ConnectionId, ConnectionSettings, InboundEvent};
use crate::config::ClientConfig;
use crate::diagnostics::StatisticsCollector;
use crate::listener::Member;

/// Events emitted when connections are registered or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection was authenticated and registered.
    Connected {
        /// The connection identifier.
        id: ConnectionId,
        /// The member on the other end.
        member_uuid: Uuid,
        /// The address of the connected member.
        address: SocketAddr,
    },
    /// A registered connection was removed.
    Disconnected {
        /// The connection identifier.
        id: ConnectionId,
        /// The member on the other end.
        member_uuid: Uuid,
        /// The address of the disconnected member.
        address: SocketAddr,
        /// Why the connection was removed.
        reason: String,
    },
}

/// Owns the live connections, one per member, keyed by member UUID.
///
/// At most one connection attempt per member runs at a time. Connections are
/// handed out as `Arc` for a single write and are never reused once closed.
#[derive(Debug)]
pub struct ConnectionRegistry {
    settings: ConnectionSettings,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    connections: DashMap<Uuid, Arc<Connection>>,
    connect_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    unreachable: DashSet<Uuid>,
    inbound: mpsc::Sender<InboundEvent>,
    events: broadcast::Sender<ConnectionEvent>,
    statistics: Arc<StatisticsCollector>,
    closed: AtomicBool,
}

impl ConnectionRegistry {
    /// Creates a registry whose connections report to `inbound`.
    pub fn new(
        config: &ClientConfig,
        client_uuid: Uuid,
        inbound: mpsc::Sender<InboundEvent>,
        statistics: Arc<StatisticsCollector>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            settings: ConnectionSettings::from_config(config, client_uuid),
            heartbeat_interval: config.network().heartbeat_interval(),
            heartbeat_timeout: config.network().heartbeat_timeout(),
            connections: DashMap::new(),
            connect_locks: DashMap::new(),
            unreachable: DashSet::new(),
            inbound,
            events,
            statistics,
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribes to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Returns the live connection to `member_uuid`, if any.
    pub fn get(&self, member_uuid: &Uuid) -> Option<Arc<Connection>> {
        self.connections
            .get(member_uuid)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|connection| connection.is_alive())
    }

    /// Returns every live connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_alive())
            .count()
    }

    /// Returns true if at least one live connection exists.
    pub fn has_connections(&self) -> bool {
        self.connections.iter().any(|entry| entry.value().is_alive())
    }

    /// Returns the connection to `member`, opening one if needed.
    ///
    /// # Errors
    ///
    /// - `GridError::Transport` if the member is marked unreachable or the
    ///   connection attempt fails.
    /// - `GridError::Topology` if another member answers at the address.
    /// - Any handshake error from [`Connection::establish`].
    #[instrument(name = "registry.get_or_connect", skip(self, member), fields(member = %member.uuid()))]
    pub async fn get_or_connect(&self, member: &Member) -> Result<Arc<Connection>> {
        let member_uuid = member.uuid();
        if let Some(connection) = self.get(&member_uuid) {
            return Ok(connection);
        }
        if self.is_unreachable(&member_uuid) {
            return Err(GridError::Transport(format!(
                "member {} is marked unreachable",
                member_uuid
            )));
        }
        self.connect_member(member).await
    }

    /// Opens a connection to `member` even if it is marked unreachable.
    ///
    /// A successful connection clears the mark. Used by background repair.
    pub async fn connect_member(&self, member: &Member) -> Result<Arc<Connection>> {
        let member_uuid = member.uuid();
        let lock = self
            .connect_locks
            .entry(member_uuid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(connection) = self.get(&member_uuid) {
            return Ok(connection);
        }

        let connection =
            Connection::establish(member.address(), &self.settings, self.inbound.clone()).await?;
        if connection.member_uuid() != member_uuid {
            connection.close("member identity mismatch");
            return Err(GridError::Topology(format!(
                "{} answered as member {} instead of {}",
                member.address(),
                connection.member_uuid(),
                member_uuid
            )));
        }

        self.register(Arc::clone(&connection))?;
        self.unreachable.remove(&member_uuid);
        Ok(connection)
    }

    /// Opens a connection to `address` before the member UUID is known.
    ///
    /// If a live connection to the answering member already exists, the new
    /// one is closed and the existing one returned.
    #[instrument(name = "registry.connect_to_address", skip(self, address), fields(address = %address))]
    pub async fn connect_to_address(&self, address: SocketAddr) -> Result<Arc<Connection>> {
        let connection = Connection::establish(address, &self.settings, self.inbound.clone()).await?;
        let member_uuid = connection.member_uuid();

        if let Some(existing) = self.get(&member_uuid) {
            connection.close("duplicate connection");
            return Ok(existing);
        }

        self.register(Arc::clone(&connection))?;
        self.unreachable.remove(&member_uuid);
        Ok(connection)
    }

    /// Returns true once [`close_all`](Self::close_all) ran.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn register(&self, connection: Arc<Connection>) -> Result<()> {
        let member_uuid = connection.member_uuid();
        if self.is_closed() {
            connection.close("registry closed");
            return Err(GridError::ClientOffline(
                "client is shut down".to_string(),
            ));
        }
        if let Some(previous) = self.connections.insert(member_uuid, Arc::clone(&connection)) {
            if previous.id() != connection.id() {
                previous.close("replaced by a newer connection");
                self.statistics.record_connection_closed();
            }
        }
        self.statistics.record_connection_opened();

        // close_all may have swept the map between the check and the insert.
        if self.is_closed() {
            if self
                .connections
                .remove_if(&member_uuid, |_, registered| registered.id() == connection.id())
                .is_some()
            {
                connection.close("registry closed");
                self.statistics.record_connection_closed();
            }
            return Err(GridError::ClientOffline(
                "client is shut down".to_string(),
            ));
        }

        tracing::info!(
            id = %connection.id(),
            member = %member_uuid,
            address = %connection.address(),
            "connected to member"
        );
        let _ = self.events.send(ConnectionEvent::Connected {
            id: connection.id(),
            member_uuid,
            address: connection.address(),
        });
        Ok(())
    }

    /// Removes and closes the connection to `member_uuid`.
    ///
    /// Returns false if no connection was registered. Invocations pending on
    /// the connection fail once its read loop reports the closure.
    pub fn close_and_remove(&self, member_uuid: &Uuid, reason: &str) -> bool {
        match self.connections.remove(member_uuid) {
            Some((_, connection)) => {
                self.finish_removal(connection, reason);
                true
            }
            None => false,
        }
    }

    /// Removes the connection with `connection_id` if it is still the one
    /// registered for `member_uuid`.
    pub fn remove_connection(
        &self,
        connection_id: ConnectionId,
        member_uuid: &Uuid,
        reason: &str,
    ) -> bool {
        match self
            .connections
            .remove_if(member_uuid, |_, connection| connection.id() == connection_id)
        {
            Some((_, connection)) => {
                self.finish_removal(connection, reason);
                true
            }
            None => false,
        }
    }

    fn finish_removal(&self, connection: Arc<Connection>, reason: &str) {
        connection.close(reason);
        self.statistics.record_connection_closed();
        tracing::info!(
            id = %connection.id(),
            member = %connection.member_uuid(),
            address = %connection.address(),
            reason = %reason,
            "connection removed"
        );
        let _ = self.events.send(ConnectionEvent::Disconnected {
            id: connection.id(),
            member_uuid: connection.member_uuid(),
            address: connection.address(),
            reason: reason.to_string(),
        });
    }

    /// Marks `member_uuid` unreachable; connection attempts fail fast.
    pub fn mark_unreachable(&self, member_uuid: Uuid) {
        if self.unreachable.insert(member_uuid) {
            tracing::warn!(member = %member_uuid, "member marked unreachable");
        }
    }

    /// Clears the unreachable mark.
    pub fn clear_unreachable(&self, member_uuid: &Uuid) {
        self.unreachable.remove(member_uuid);
    }

    /// Returns true if `member_uuid` is marked unreachable.
    pub fn is_unreachable(&self, member_uuid: &Uuid) -> bool {
        self.unreachable.contains(member_uuid)
    }

    /// Returns every member currently marked unreachable.
    pub fn unreachable_members(&self) -> Vec<Uuid> {
        self.unreachable.iter().map(|uuid| *uuid).collect()
    }

    /// Removes every connection and waits for the I/O tasks to stop.
    ///
    /// Connections established afterwards are closed instead of registered.
    pub async fn close_all(&self, reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
        let members: Vec<Uuid> = self.connections.iter().map(|entry| *entry.key()).collect();
        for member_uuid in members {
            if let Some((_, connection)) = self.connections.remove(&member_uuid) {
                connection.close_and_wait(reason).await;
                self.statistics.record_connection_closed();
                let _ = self.events.send(ConnectionEvent::Disconnected {
                    id: connection.id(),
                    member_uuid,
                    address: connection.address(),
                    reason: reason.to_string(),
                });
            }
        }
        self.connect_locks.clear();
    }

    /// Runs one heartbeat round.
    ///
    /// Connections silent for longer than the heartbeat timeout are removed;
    /// connections idle for writes get a ping.
    pub async fn heartbeat_tick(&self) {
        let snapshot: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for connection in snapshot {
            if connection.idle_read() >= self.heartbeat_timeout {
                tracing::warn!(
                    id = %connection.id(),
                    member = %connection.member_uuid(),
                    idle = ?connection.idle_read(),
                    "heartbeat timeout, closing connection"
                );
                self.statistics.record_heartbeat_failure();
                self.remove_connection(connection.id(), &connection.member_uuid(), "heartbeat timeout");
            } else if connection.idle_write() >= self.heartbeat_interval {
                if let Err(e) = connection.send(ping_request()).await {
                    tracing::debug!(id = %connection.id(), error = %e, "heartbeat ping failed");
                }
            }
        }
    }

    /// Spawns the heartbeat task, stopped by `shutdown`.
    pub fn spawn_heartbeat(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(registry.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => registry.heartbeat_tick().await,
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            tracing::debug!("heartbeat task shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
