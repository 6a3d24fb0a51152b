//! Client statistics collection and reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Statistics for client connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    active_connections: u64,
    total_connections_opened: u64,
    total_connections_closed: u64,
    heartbeat_failures: u64,
}

impl ConnectionStats {
    /// Returns the number of currently active connections.
    pub fn active_connections(&self) -> u64 {
        self.active_connections
    }

    /// Returns the total number of connections opened since client start.
    pub fn total_connections_opened(&self) -> u64 {
        self.total_connections_opened
    }

    /// Returns the total number of connections closed since client start.
    pub fn total_connections_closed(&self) -> u64 {
        self.total_connections_closed
    }

    /// Returns how many connections were declared dead by the heartbeat.
    pub fn heartbeat_failures(&self) -> u64 {
        self.heartbeat_failures
    }
}

/// Statistics for invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationStats {
    started: u64,
    completed: u64,
    failed: u64,
    timed_out: u64,
    retried: u64,
    late_responses: u64,
}

impl InvocationStats {
    /// Returns the number of invocations submitted.
    pub fn started(&self) -> u64 {
        self.started
    }

    /// Returns the number of invocations that completed with a response.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Returns the number of invocations that failed.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Returns the number of invocations whose deadline elapsed.
    pub fn timed_out(&self) -> u64 {
        self.timed_out
    }

    /// Returns the number of retry attempts made.
    pub fn retried(&self) -> u64 {
        self.retried
    }

    /// Returns the number of responses that arrived for no pending invocation.
    pub fn late_responses(&self) -> u64 {
        self.late_responses
    }

    /// Returns invocations that have not reached a terminal state.
    pub fn in_flight(&self) -> u64 {
        self.started
            .saturating_sub(self.completed + self.failed + self.timed_out)
    }
}

/// Point-in-time view of client statistics.
#[derive(Debug, Clone)]
pub struct ClientStatistics {
    connection_stats: ConnectionStats,
    invocation_stats: InvocationStats,
    collected_at: Instant,
    uptime: Duration,
}

impl ClientStatistics {
    /// Returns connection statistics.
    pub fn connection_stats(&self) -> &ConnectionStats {
        &self.connection_stats
    }

    /// Returns invocation statistics.
    pub fn invocation_stats(&self) -> &InvocationStats {
        &self.invocation_stats
    }

    /// Returns when these statistics were collected.
    pub fn collected_at(&self) -> Instant {
        self.collected_at
    }

    /// Returns the client uptime when these statistics were collected.
    pub fn uptime(&self) -> Duration {
        self.uptime
    }
}

/// Collector for tracking client statistics.
///
/// All counters are atomics, so recording never blocks the hot path.
#[derive(Debug)]
pub struct StatisticsCollector {
    started_at: Instant,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    heartbeat_failures: AtomicU64,
    invocations_started: AtomicU64,
    invocations_completed: AtomicU64,
    invocations_failed: AtomicU64,
    invocations_timed_out: AtomicU64,
    invocations_retried: AtomicU64,
    late_responses: AtomicU64,
}

impl StatisticsCollector {
    /// Creates a new statistics collector.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            heartbeat_failures: AtomicU64::new(0),
            invocations_started: AtomicU64::new(0),
            invocations_completed: AtomicU64::new(0),
            invocations_failed: AtomicU64::new(0),
            invocations_timed_out: AtomicU64::new(0),
            invocations_retried: AtomicU64::new(0),
            late_responses: AtomicU64::new(0),
        }
    }

    /// Records a connection being opened.
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection being closed.
    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a connection declared dead for lack of inbound traffic.
    pub fn record_heartbeat_failure(&self) {
        self.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a submitted invocation.
    pub fn record_invocation_started(&self) {
        self.invocations_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an invocation completed with a response.
    pub fn record_invocation_completed(&self) {
        self.invocations_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an invocation that failed terminally.
    pub fn record_invocation_failed(&self) {
        self.invocations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an invocation whose deadline elapsed.
    pub fn record_invocation_timed_out(&self) {
        self.invocations_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retry attempt.
    pub fn record_invocation_retried(&self) {
        self.invocations_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a response discarded because nothing was waiting for it.
    pub fn record_late_response(&self) {
        self.late_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Collects a snapshot of current statistics.
    pub fn collect(&self, active_connections: u64) -> ClientStatistics {
        let now = Instant::now();

        let connection_stats = ConnectionStats {
            active_connections,
            total_connections_opened: self.connections_opened.load(Ordering::Relaxed),
            total_connections_closed: self.connections_closed.load(Ordering::Relaxed),
            heartbeat_failures: self.heartbeat_failures.load(Ordering::Relaxed),
        };

        let invocation_stats = InvocationStats {
            started: self.invocations_started.load(Ordering::Relaxed),
            completed: self.invocations_completed.load(Ordering::Relaxed),
            failed: self.invocations_failed.load(Ordering::Relaxed),
            timed_out: self.invocations_timed_out.load(Ordering::Relaxed),
            retried: self.invocations_retried.load(Ordering::Relaxed),
            late_responses: self.late_responses.load(Ordering::Relaxed),
        };

        ClientStatistics {
            connection_stats,
            invocation_stats,
            collected_at: now,
            uptime: now.duration_since(self.started_at),
        }
    }

    /// Returns the client uptime.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic statistics reporter.
///
/// Every `period` the reporter collects a snapshot, using `active_connections`
/// to sample the live connection count, and hands it to `report_fn`. The task
/// ends when `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_reporter<A, F>(
    collector: Arc<StatisticsCollector>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    active_connections: A,
    mut report_fn: F,
) -> JoinHandle<()>
where
    A: Fn() -> u64 + Send + 'static,
    F: FnMut(ClientStatistics) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        tracing::debug!("statistics reporter shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    report_fn(collector.collect(active_connections()));
                }
            }
        }
    })
}

/// Logs a statistics snapshot at info level.
pub fn log_statistics(stats: &ClientStatistics) {
    let conn = stats.connection_stats();
    let inv = stats.invocation_stats();
    tracing::info!(
        uptime_secs = stats.uptime().as_secs(),
        active_connections = conn.active_connections(),
        connections_opened = conn.total_connections_opened(),
        connections_closed = conn.total_connections_closed(),
        heartbeat_failures = conn.heartbeat_failures(),
        invocations_started = inv.started(),
        invocations_completed = inv.completed(),
        invocations_failed = inv.failed(),
        invocations_timed_out = inv.timed_out(),
        invocations_retried = inv.retried(),
        late_responses = inv.late_responses(),
        "client statistics"
    );
}
