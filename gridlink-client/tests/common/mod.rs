//! In-process mock cluster for integration tests.
//!
//! Members listen on 127.0.0.1:0, answer the handshake, heartbeats and
//! membership requests, and hand every other request to a per-member
//! [`Responder`].

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gridlink_client::{ClientConfig, ClientConfigBuilder};
use gridlink_core::protocol::{
    AuthenticationResponse, AuthenticationStatus, ClientMessage, ClientMessageCodec, ClusterView,
    ErrorRecord, MemberInfo, CLIENT_AUTHENTICATION, CLIENT_PING, CLIENT_PING_RESPONSE,
    CLUSTER_VIEW_LISTEN, CLUSTER_VIEW_LISTEN_RESPONSE, CLUSTER_VIEW_REQUEST,
    SERIALIZATION_VERSION,
};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use uuid::Uuid;

pub const PARTITION_COUNT: i32 = 271;

/// What a member does with a request.
pub enum Reply {
    Respond(ClientMessage),
    RespondAfter(Duration, ClientMessage),
    Ignore,
    Disconnect,
}

pub type Responder = Arc<dyn Fn(&ClientMessage) -> Reply + Send + Sync>;

/// Answers with the request's own type and payload.
pub fn echo(request: &ClientMessage) -> Reply {
    Reply::Respond(ClientMessage::new_response(
        request.message_type(),
        request.correlation_id(),
        request.payload().clone(),
    ))
}

pub fn echo_responder() -> Responder {
    Arc::new(echo)
}

pub fn silent_responder() -> Responder {
    Arc::new(|_: &ClientMessage| Reply::Ignore)
}

pub fn error_responder(code: i32, class_name: &'static str) -> Responder {
    Arc::new(move |request: &ClientMessage| {
        Reply::Respond(
            ErrorRecord::new(code, class_name, "rejected by test member")
                .encode(request.correlation_id()),
        )
    })
}

/// Replies after the number of milliseconds encoded in the payload's first
/// byte.
pub fn delayed_echo_responder() -> Responder {
    Arc::new(|request: &ClientMessage| {
        let delay = request.payload().first().copied().unwrap_or(0);
        let response = ClientMessage::new_response(
            request.message_type(),
            request.correlation_id(),
            request.payload().clone(),
        );
        Reply::RespondAfter(Duration::from_millis(u64::from(delay)), response)
    })
}

/// Closes the connection on the first request, echoes afterwards.
pub fn disconnect_once_responder() -> Responder {
    let seen = Arc::new(AtomicUsize::new(0));
    Arc::new(move |request: &ClientMessage| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Reply::Disconnect
        } else {
            echo(request)
        }
    })
}

pub fn disconnect_responder() -> Responder {
    Arc::new(|_: &ClientMessage| Reply::Disconnect)
}

struct ClusterState {
    cluster_id: Uuid,
    auth_status: Mutex<AuthenticationStatus>,
    version: AtomicI64,
    members: Mutex<Vec<MemberInfo>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ClientMessage>>>,
}

impl ClusterState {
    fn view(&self) -> ClusterView {
        let members = self.members.lock().unwrap().clone();
        let partition_owners = (0..PARTITION_COUNT as usize)
            .map(|p| members.get(p % members.len().max(1)).map(|m| m.uuid))
            .collect();
        ClusterView {
            version: self.version.load(Ordering::SeqCst),
            members,
            partition_owners,
        }
    }

    fn push(&self, view: &ClusterView) {
        let event = view.encode_event();
        self.listeners
            .lock()
            .unwrap()
            .retain(|listener| listener.send(event.clone()).is_ok());
    }
}

/// A mock member process.
pub struct MockMember {
    uuid: Uuid,
    address: SocketAddr,
    responder: Arc<RwLock<Responder>>,
    answer_pings: Arc<std::sync::atomic::AtomicBool>,
    answer_view_listen: Arc<std::sync::atomic::AtomicBool>,
    auth_delay: Arc<Mutex<Duration>>,
    accepted: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
    listen_requests: Arc<AtomicUsize>,
    kill_tx: broadcast::Sender<()>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl MockMember {
    async fn spawn(cluster: Arc<ClusterState>) -> Arc<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve_on(cluster, Uuid::new_v4(), listener)
    }

    fn serve_on(cluster: Arc<ClusterState>, uuid: Uuid, listener: TcpListener) -> Arc<Self> {
        let address = listener.local_addr().unwrap();
        let (kill_tx, _) = broadcast::channel(4);

        let member = Arc::new(Self {
            uuid,
            address,
            responder: Arc::new(RwLock::new(echo_responder())),
            answer_pings: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            answer_view_listen: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            auth_delay: Arc::new(Mutex::new(Duration::ZERO)),
            accepted: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
            listen_requests: Arc::new(AtomicUsize::new(0)),
            kill_tx,
            accept_task: Mutex::new(None),
        });

        let serving = Arc::clone(&member);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                serving.accepted.fetch_add(1, Ordering::SeqCst);
                let connection = MemberConnection {
                    member_uuid: serving.uuid,
                    address: serving.address,
                    responder: Arc::clone(&serving.responder),
                    answer_pings: Arc::clone(&serving.answer_pings),
                    answer_view_listen: Arc::clone(&serving.answer_view_listen),
                    auth_delay: *serving.auth_delay.lock().unwrap(),
                    requests: Arc::clone(&serving.requests),
                    listen_requests: Arc::clone(&serving.listen_requests),
                    cluster: Arc::clone(&cluster),
                };
                let kill = serving.kill_tx.subscribe();
                tokio::spawn(connection.serve(socket, kill));
            }
        });
        *member.accept_task.lock().unwrap() = Some(task);
        member
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Application requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn set_responder(&self, responder: Responder) {
        *self.responder.write().unwrap() = responder;
    }

    /// View listener registrations received so far.
    pub fn listen_requests(&self) -> usize {
        self.listen_requests.load(Ordering::SeqCst)
    }

    pub fn set_answer_pings(&self, answer: bool) {
        self.answer_pings.store(answer, Ordering::SeqCst);
    }

    /// When false, view listener registrations are never answered.
    pub fn set_answer_view_listen(&self, answer: bool) {
        self.answer_view_listen.store(answer, Ordering::SeqCst);
    }

    /// Delays the handshake response on connections accepted afterwards.
    pub fn set_auth_delay(&self, delay: Duration) {
        *self.auth_delay.lock().unwrap() = delay;
    }

    /// Drops every open connection; new connections are still accepted.
    pub fn kill_connections(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Stops listening and drops every open connection.
    pub fn stop(&self) {
        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
        }
        self.kill_connections();
    }
}

struct MemberConnection {
    member_uuid: Uuid,
    address: SocketAddr,
    responder: Arc<RwLock<Responder>>,
    answer_pings: Arc<std::sync::atomic::AtomicBool>,
    answer_view_listen: Arc<std::sync::atomic::AtomicBool>,
    auth_delay: Duration,
    requests: Arc<AtomicUsize>,
    listen_requests: Arc<AtomicUsize>,
    cluster: Arc<ClusterState>,
}

impl MemberConnection {
    async fn serve(self, mut socket: TcpStream, mut kill: broadcast::Receiver<()>) {
        let mut preamble = [0u8; 3];
        if socket.read_exact(&mut preamble).await.is_err() {
            return;
        }

        let (mut sink, mut stream) = Framed::new(socket, ClientMessageCodec::new()).split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();

        loop {
            tokio::select! {
                _ = kill.recv() => break,
                outgoing = out_rx.recv() => match outgoing {
                    Some(message) => {
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(message)) => {
                        if !self.handle(message, &out_tx) {
                            break;
                        }
                    }
                    _ => break,
                },
            }
        }
    }

    /// Returns false to close the connection.
    fn handle(&self, request: ClientMessage, out: &mpsc::UnboundedSender<ClientMessage>) -> bool {
        let correlation_id = request.correlation_id();
        match request.message_type() {
            CLIENT_AUTHENTICATION => {
                let status = *self.cluster.auth_status.lock().unwrap();
                let response = AuthenticationResponse {
                    status,
                    member_uuid: self.member_uuid,
                    member_address: self.address,
                    partition_count: PARTITION_COUNT,
                    cluster_id: self.cluster.cluster_id,
                    serialization_version: SERIALIZATION_VERSION,
                };
                let response = response.encode(correlation_id);
                if self.auth_delay.is_zero() {
                    let _ = out.send(response);
                } else {
                    let out = out.clone();
                    let delay = self.auth_delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = out.send(response);
                    });
                }
            }
            CLIENT_PING => {
                if self.answer_pings.load(Ordering::SeqCst) {
                    let _ = out.send(ClientMessage::new_response(
                        CLIENT_PING_RESPONSE,
                        correlation_id,
                        Vec::new(),
                    ));
                }
            }
            CLUSTER_VIEW_LISTEN => {
                self.listen_requests.fetch_add(1, Ordering::SeqCst);
                if !self.answer_view_listen.load(Ordering::SeqCst) {
                    return true;
                }
                let _ = out.send(ClientMessage::new_response(
                    CLUSTER_VIEW_LISTEN_RESPONSE,
                    correlation_id,
                    Vec::new(),
                ));
                let _ = out.send(self.cluster.view().encode_event());
                self.cluster.listeners.lock().unwrap().push(out.clone());
            }
            CLUSTER_VIEW_REQUEST => {
                let _ = out.send(self.cluster.view().encode_response(correlation_id));
            }
            _ => {
                self.requests.fetch_add(1, Ordering::SeqCst);
                let responder = Arc::clone(&*self.responder.read().unwrap());
                match responder(&request) {
                    Reply::Respond(response) => {
                        let _ = out.send(response);
                    }
                    Reply::RespondAfter(delay, response) => {
                        let out = out.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = out.send(response);
                        });
                    }
                    Reply::Ignore => {}
                    Reply::Disconnect => return false,
                }
            }
        }
        true
    }
}

/// A set of mock members sharing one membership view.
pub struct MockCluster {
    state: Arc<ClusterState>,
    members: Mutex<Vec<Arc<MockMember>>>,
}

impl MockCluster {
    /// Starts `size` members, all in the initial view.
    pub async fn start(size: usize) -> Self {
        let state = Arc::new(ClusterState {
            cluster_id: Uuid::new_v4(),
            auth_status: Mutex::new(AuthenticationStatus::Authenticated),
            version: AtomicI64::new(1),
            members: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        });
        let cluster = Self {
            state,
            members: Mutex::new(Vec::new()),
        };
        for _ in 0..size {
            let member = MockMember::spawn(Arc::clone(&cluster.state)).await;
            cluster
                .state
                .members
                .lock()
                .unwrap()
                .push(MemberInfo::new(member.uuid(), member.address()));
            cluster.members.lock().unwrap().push(member);
        }
        cluster
    }

    pub fn member(&self, index: usize) -> Arc<MockMember> {
        Arc::clone(&self.members.lock().unwrap()[index])
    }

    pub fn members(&self) -> Vec<Arc<MockMember>> {
        self.members.lock().unwrap().clone()
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.members().iter().map(|m| m.address()).collect()
    }

    pub fn version(&self) -> i64 {
        self.state.version.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> ClusterView {
        self.state.view()
    }

    pub fn set_auth_status(&self, status: AuthenticationStatus) {
        *self.state.auth_status.lock().unwrap() = status;
    }

    /// Starts a new member, adds it to the view and pushes the view.
    pub async fn add_member(&self) -> Arc<MockMember> {
        self.add_member_with(|_| {}).await
    }

    /// Like [`add_member`](Self::add_member), configuring the member before
    /// the view announcing it is pushed.
    pub async fn add_member_with<F>(&self, configure: F) -> Arc<MockMember>
    where
        F: FnOnce(&MockMember),
    {
        let member = MockMember::spawn(Arc::clone(&self.state)).await;
        configure(&member);
        self.state
            .members
            .lock()
            .unwrap()
            .push(MemberInfo::new(member.uuid(), member.address()));
        self.members.lock().unwrap().push(Arc::clone(&member));
        self.publish_view();
        member
    }

    /// Removes a member from the view and pushes the view. The member keeps
    /// running.
    pub fn remove_member(&self, uuid: Uuid) {
        self.state.members.lock().unwrap().retain(|m| m.uuid != uuid);
        self.publish_view();
    }

    /// Bumps the version and pushes the current view to every listener.
    pub fn publish_view(&self) {
        self.state.version.fetch_add(1, Ordering::SeqCst);
        let view = self.state.view();
        self.state.push(&view);
    }

    /// Pushes an arbitrary view without touching the cluster state.
    pub fn push_view(&self, view: &ClusterView) {
        self.state.push(view);
    }

    pub fn stop(&self) {
        for member in self.members() {
            member.stop();
        }
    }

    /// Starts a stopped member again on its old address with its old UUID.
    pub async fn restart_member(&self, index: usize) -> Arc<MockMember> {
        let previous = self.member(index);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let listener = loop {
            match TcpListener::bind(previous.address()).await {
                Ok(listener) => break listener,
                Err(e) if tokio::time::Instant::now() < deadline => {
                    tracing::debug!(error = %e, "address still in use, retrying bind");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                Err(e) => panic!("could not rebind {}: {}", previous.address(), e),
            }
        };
        let member = MockMember::serve_on(Arc::clone(&self.state), previous.uuid(), listener);
        self.members.lock().unwrap()[index] = Arc::clone(&member);
        member
    }
}

/// Client configuration pointing at every member, with short timeouts.
pub fn config_builder(cluster: &MockCluster) -> ClientConfigBuilder {
    let mut builder = ClientConfig::builder().cluster_name("dev");
    for address in cluster.addresses() {
        builder = builder.add_address(address);
    }
    builder
        .connection_timeout(Duration::from_secs(2))
        .invocation_timeout(Duration::from_secs(5))
        .retry(|r| {
            r.initial_backoff(Duration::from_millis(20))
                .max_backoff(Duration::from_millis(200))
                .jitter(0.0)
                .connection_attempt_limit(3)
        })
}

pub fn config(cluster: &MockCluster) -> ClientConfig {
    config_builder(cluster).build().expect("failed to build config")
}

/// Polls `condition` every 20ms until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
