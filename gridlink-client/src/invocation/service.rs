//! Drives invocations from submission to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use gridlink_core::protocol::{ClientMessage, ErrorRecord, HEARTBEAT_CORRELATION_ID};
use gridlink_core::{GridError, Result};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::instrument;
use uuid::Uuid;

use super::correlation::CorrelationIdGenerator;
use super::pending::{PendingGuard, PendingRegistration, PendingTable};
use super::retry::Backoff;
use super::state::InvocationState;
use super::Invocation;
use crate::cluster::PartitionRouter;
use crate::config::{ClientConfig, RetryConfig};
use crate::connection::{Connection, ConnectionId, ConnectionRegistry};
use crate::diagnostics::StatisticsCollector;

/// Invocation settings taken from the client configuration.
#[derive(Debug, Clone)]
pub struct InvocationSettings {
    /// Default deadline of an invocation.
    pub timeout: Duration,
    /// Retries allowed after the first attempt.
    pub retry_count: u32,
    /// Retry non-idempotent requests that may have reached a member.
    pub redo_operation: bool,
    /// Bound on concurrently running invocations; 0 means unbounded.
    pub max_concurrent: usize,
    /// Backoff between attempts.
    pub retry: RetryConfig,
}

impl InvocationSettings {
    /// Derives settings from the client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            timeout: config.invocation_timeout(),
            retry_count: config.invocation_retry_count(),
            redo_operation: config.redo_operation(),
            max_concurrent: config.max_concurrent_invocations(),
            retry: config.retry().clone(),
        }
    }
}

/// Why an attempt failed, and whether its frame was queued on a connection.
#[derive(Debug)]
struct AttemptFailure {
    error: GridError,
    sent: bool,
}

impl AttemptFailure {
    fn unsent(error: GridError) -> Self {
        Self { error, sent: false }
    }

    fn sent(error: GridError) -> Self {
        Self { error, sent: true }
    }
}

fn transition(state: &mut InvocationState, next: InvocationState, correlation_id: i64) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal invocation transition {} -> {}",
        state,
        next
    );
    tracing::trace!(correlation_id, from = %state, to = %next, "invocation state change");
    *state = next;
}

/// Sends invocations, matches responses and applies the retry policy.
#[derive(Debug)]
pub struct InvocationService {
    router: Arc<PartitionRouter>,
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingTable>,
    ids: CorrelationIdGenerator,
    statistics: Arc<StatisticsCollector>,
    permits: Option<Arc<Semaphore>>,
    settings: InvocationSettings,
    shutdown: watch::Receiver<bool>,
}

impl InvocationService {
    /// Creates the service.
    pub fn new(
        router: Arc<PartitionRouter>,
        registry: Arc<ConnectionRegistry>,
        settings: InvocationSettings,
        statistics: Arc<StatisticsCollector>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let permits = match settings.max_concurrent {
            0 => None,
            max => Some(Arc::new(Semaphore::new(max))),
        };
        Self {
            router,
            registry,
            pending: Arc::new(PendingTable::new()),
            ids: CorrelationIdGenerator::new(),
            statistics,
            permits,
            settings,
            shutdown,
        }
    }

    /// Returns the pending table.
    pub fn pending(&self) -> &Arc<PendingTable> {
        &self.pending
    }

    /// Returns the settings in use.
    pub fn settings(&self) -> &InvocationSettings {
        &self.settings
    }

    /// Sends `invocation` and waits for its response.
    ///
    /// # Errors
    ///
    /// - `GridError::ClientOffline` if the client has no live connection or is
    ///   shut down.
    /// - `GridError::Timeout` if the deadline elapses first.
    /// - `GridError::Application` for server-side errors.
    /// - The last retryable error once the retry budget is spent.
    #[instrument(
        name = "invocation.invoke",
        skip(self, invocation),
        fields(message_type = invocation.message_type(), idempotent = invocation.is_idempotent())
    )]
    pub async fn invoke(&self, invocation: Invocation) -> Result<ClientMessage> {
        if *self.shutdown.borrow() {
            return Err(GridError::ClientOffline("client is shut down".to_string()));
        }
        if !self.registry.has_connections() {
            return Err(GridError::ClientOffline(
                "no live connection to the cluster".to_string(),
            ));
        }

        let timeout = invocation.timeout().unwrap_or(self.settings.timeout);
        let deadline = Instant::now() + timeout;
        self.statistics.record_invocation_started();

        let _permit = self.acquire_permit(deadline, timeout).await?;

        let mut state = InvocationState::Created;
        let mut correlation_id = 0;
        let mut backoff = Backoff::new(&self.settings.retry);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = tokio::time::timeout_at(
                deadline,
                self.attempt(&invocation, attempt, deadline, &mut state, &mut correlation_id),
            )
            .await;

            match outcome {
                Err(_) => {
                    transition(&mut state, InvocationState::TimedOut, correlation_id);
                    self.statistics.record_invocation_timed_out();
                    tracing::warn!(correlation_id, attempt, "invocation timed out");
                    return Err(GridError::Timeout(format!(
                        "invocation did not complete within {:?}",
                        timeout
                    )));
                }
                Ok(Ok(response)) => {
                    transition(&mut state, InvocationState::Completed, correlation_id);
                    self.statistics.record_invocation_completed();
                    return Ok(response);
                }
                Ok(Err(failure)) => {
                    transition(&mut state, InvocationState::Failed, correlation_id);

                    if !self.should_retry(&invocation, &failure, attempt) {
                        self.statistics.record_invocation_failed();
                        tracing::debug!(
                            correlation_id,
                            attempt,
                            error = %failure.error,
                            "invocation failed"
                        );
                        return Err(failure.error);
                    }

                    let delay = backoff.next_delay();
                    if Instant::now() + delay >= deadline {
                        self.statistics.record_invocation_failed();
                        tracing::debug!(
                            correlation_id,
                            attempt,
                            error = %failure.error,
                            "no time left to retry invocation"
                        );
                        return Err(failure.error);
                    }

                    self.statistics.record_invocation_retried();
                    tracing::debug!(
                        correlation_id,
                        attempt,
                        delay = ?delay,
                        error = %failure.error,
                        "retrying invocation"
                    );
                    tokio::time::sleep(delay).await;
                    transition(&mut state, InvocationState::Created, correlation_id);
                }
            }
        }
    }

    async fn acquire_permit(
        &self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(permits) = &self.permits else {
            return Ok(None);
        };

        match tokio::time::timeout_at(deadline, Arc::clone(permits).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(Some(permit)),
            Ok(Err(_)) => {
                self.statistics.record_invocation_failed();
                Err(GridError::ClientOffline("client is shut down".to_string()))
            }
            Err(_) => {
                self.statistics.record_invocation_timed_out();
                Err(GridError::Timeout(format!(
                    "no invocation slot became free within {:?}",
                    timeout
                )))
            }
        }
    }

    async fn attempt(
        &self,
        invocation: &Invocation,
        attempt: u32,
        deadline: Instant,
        state: &mut InvocationState,
        correlation_id: &mut i64,
    ) -> std::result::Result<ClientMessage, AttemptFailure> {
        let route = self
            .router
            .resolve(invocation.target())
            .map_err(AttemptFailure::unsent)?;
        let connection = self
            .router
            .connection_for(&route)
            .await
            .map_err(AttemptFailure::unsent)?;

        let (id, receiver) = self.pending.register(
            &self.ids,
            PendingRegistration {
                target: Some(connection.member_uuid()),
                connection_id: connection.id(),
                attempt,
                deadline: deadline.into_std(),
            },
        );
        let _guard = PendingGuard::new(Arc::clone(&self.pending), id);
        *correlation_id = id;
        transition(state, InvocationState::Pending, id);

        // A closure signalled before the record existed would not reach it.
        if !connection.is_alive() {
            return Err(AttemptFailure::unsent(GridError::Transport(format!(
                "{} to {} is closed",
                connection.id(),
                connection.address()
            ))));
        }

        let mut message = ClientMessage::new_partition_request(
            invocation.message_type(),
            route.partition_id,
            invocation.payload().clone(),
        );
        message.set_correlation_id(id);
        connection.send(message).await.map_err(AttemptFailure::unsent)?;

        tracing::debug!(
            correlation_id = id,
            attempt,
            connection = %connection.id(),
            member = %connection.member_uuid(),
            partition_id = route.partition_id,
            "request sent"
        );
        drop(connection);

        match receiver.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(AttemptFailure::sent(error)),
            Err(_) => Err(AttemptFailure::sent(GridError::Transport(
                "pending invocation was dropped".to_string(),
            ))),
        }
    }

    /// Sends `message` on `connection` once, without routing or retries.
    ///
    /// Used for cluster housekeeping requests that must go to a particular
    /// connection, such as view listener registration.
    pub async fn invoke_on(
        &self,
        connection: &Connection,
        mut message: ClientMessage,
        timeout: Duration,
    ) -> Result<ClientMessage> {
        let deadline = Instant::now() + timeout;
        let (id, receiver) = self.pending.register(
            &self.ids,
            PendingRegistration {
                target: Some(connection.member_uuid()),
                connection_id: connection.id(),
                attempt: 1,
                deadline: deadline.into_std(),
            },
        );
        let _guard = PendingGuard::new(Arc::clone(&self.pending), id);

        message.set_correlation_id(id);
        connection.send(message).await?;

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(GridError::Transport(
                "pending invocation was dropped".to_string(),
            )),
            Err(_) => Err(GridError::Timeout(format!(
                "{} did not answer within {:?}",
                connection.address(),
                timeout
            ))),
        }
    }

    fn should_retry(&self, invocation: &Invocation, failure: &AttemptFailure, attempt: u32) -> bool {
        failure.error.is_retryable()
            && attempt <= self.settings.retry_count
            && (invocation.is_idempotent() || self.settings.redo_operation || !failure.sent)
    }

    /// Resolves the pending invocation the response belongs to.
    ///
    /// Error frames are turned into the matching [`GridError`]. Returns false
    /// if no invocation waits for the response; such responses are dropped.
    pub fn handle_response(&self, message: ClientMessage) -> bool {
        let correlation_id = message.correlation_id();
        if correlation_id == HEARTBEAT_CORRELATION_ID {
            return false;
        }

        let outcome = if message.is_error() {
            match ErrorRecord::decode(&message) {
                Ok(record) => Err(record.into_error()),
                Err(e) => Err(e),
            }
        } else {
            Ok(message)
        };

        if self.pending.complete(correlation_id, outcome) {
            true
        } else {
            self.statistics.record_late_response();
            tracing::debug!(correlation_id, "discarding response without pending invocation");
            false
        }
    }

    /// Fails every invocation pending on a closed connection.
    pub fn connection_closed(&self, connection_id: ConnectionId, reason: &str) -> usize {
        let failed = self.pending.fail_connection(connection_id, reason);
        if failed > 0 {
            tracing::debug!(connection = %connection_id, failed, reason = %reason, "failed pending invocations");
        }
        failed
    }

    /// Fails every invocation pending against `member`.
    pub fn member_lost(&self, member: Uuid, reason: &str) -> usize {
        let failed = self.pending.fail_member(member, reason);
        if failed > 0 {
            tracing::debug!(member = %member, failed, reason = %reason, "failed pending invocations");
        }
        failed
    }

    /// Fails everything still pending; used on shutdown.
    pub fn fail_all(&self, reason: &str) -> usize {
        self.pending
            .fail_all(|| GridError::ClientOffline(reason.to_string()))
    }
}
