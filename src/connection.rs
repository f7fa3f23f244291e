//! STOMP session management with multi-endpoint connect.
//!
//! [`ConnectionManager`] owns the one live session. `connect` walks the
//! candidate endpoints in order, opening a transport and completing the STOMP
//! handshake within a per-attempt budget. Once connected, a background session
//! loop multiplexes outbound commands and inbound frames with
//! `tokio::select!`, and routes `MESSAGE` frames to per-subscription channels.
//!
//! There is no automatic reconnection: after a transport loss the state goes
//! to [`ConnectionState::Disconnected`] and every [`Subscription`] ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::LifeGameConfig;
use crate::diagnostics::probe_hosts;
use crate::error::{LifeGameError, Result};
use crate::event::{EventSink, LifeGameEvent};
use crate::stomp::{Command, Frame};
use crate::transport::{Connector, Transport};

/// Lifecycle of the connection.
///
/// `Disconnected → Connecting → {Connected, Failed}`, `Connected →
/// Disconnected`, `Failed → Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Raw message bodies delivered on one topic, in transport order.
///
/// Ends (`recv` returns `None`) when the connection ends. Dropping it makes
/// the session loop unsubscribe on the next message for this topic.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    topic: String,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    /// STOMP subscription id (`sub-<uuid>`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Destination this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message body, or `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Commands from the handle to the session loop.
#[derive(Debug)]
enum SessionCommand {
    Send {
        destination: String,
        body: String,
    },
    Subscribe {
        id: String,
        destination: String,
        tx: mpsc::UnboundedSender<String>,
    },
}

/// A running session loop.
struct Session {
    endpoint: String,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// State shared with the session loop.
struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    events: EventSink,
    /// Bumped for every new session so a stale loop cannot touch the state.
    generation: AtomicU64,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = ?next, "connection state changed");
            self.events
                .emit(LifeGameEvent::ConnectionStateChanged(next));
        }
    }

    async fn session_ended(&self, generation: u64, reason: Option<String>) {
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("stale session loop exited");
            return;
        }
        self.set_state(ConnectionState::Disconnected);
        self.events.emit_disconnected(reason).await;
    }
}

struct Inner {
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
    /// Serializes `connect` calls.
    connect_lock: tokio::sync::Mutex<()>,
    /// Bumped by `disconnect`; a running connect gives up when it changes.
    cancel_tx: watch::Sender<u64>,
    retry_backoff: Duration,
    probe_port: u16,
    probe_hosts: Vec<String>,
    probe_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; aborting drops the
        // transport.
        let session = match self.session.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(session) = session {
            session.task.abort();
        }
    }
}

/// Cloneable handle to the connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager that opens transports through `connector`.
    ///
    /// Retry backoff, probe and shutdown settings come from `config`.
    pub fn new(connector: Arc<dyn Connector>, config: &LifeGameConfig, events: EventSink) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (cancel_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                connector,
                shared: Arc::new(Shared {
                    state_tx,
                    events,
                    generation: AtomicU64::new(0),
                }),
                session: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                cancel_tx,
                retry_backoff: config.retry_backoff,
                probe_port: config.probe_port,
                probe_hosts: config.probe_hosts.clone(),
                probe_timeout: config.probe_timeout,
                shutdown_timeout: config.shutdown_timeout,
            }),
        }
    }

    /// Connect to the first endpoint that completes a STOMP handshake.
    ///
    /// Returns the endpoint in use. If a session is already live this is a
    /// no-op returning its endpoint.
    ///
    /// # Errors
    ///
    /// - [`LifeGameError::InvalidCommandState`] for an empty endpoint list.
    /// - [`LifeGameError::AllEndpointsExhausted`] when every attempt failed.
    /// - [`LifeGameError::TransportClosed`] when [`disconnect`](Self::disconnect)
    ///   cancelled the attempt.
    pub async fn connect(&self, endpoints: &[String], per_attempt_timeout: Duration) -> Result<String> {
        if endpoints.is_empty() {
            return Err(LifeGameError::InvalidCommandState(
                "no candidate endpoints configured".into(),
            ));
        }

        let _guard = self.inner.connect_lock.lock().await;
        if let Some(endpoint) = self.endpoint() {
            debug!(endpoint = %endpoint, "already connected");
            return Ok(endpoint);
        }

        let mut cancel_rx = self.inner.cancel_tx.subscribe();
        let start_epoch = *cancel_rx.borrow_and_update();
        let shared = &self.inner.shared;
        shared.set_state(ConnectionState::Connecting);

        let mut last_error: Option<LifeGameError> = None;
        for (attempt, endpoint) in endpoints.iter().enumerate() {
            if attempt > 0 && !self.inner.retry_backoff.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.inner.retry_backoff) => {}
                    _ = cancel_rx.changed() => return Err(cancelled()),
                }
            }

            info!(endpoint = %endpoint, attempt = attempt + 1, "connecting");
            let outcome = tokio::select! {
                res = tokio::time::timeout(
                    per_attempt_timeout,
                    open_session(self.inner.connector.as_ref(), endpoint),
                ) => res,
                _ = cancel_rx.changed() => return Err(cancelled()),
            };

            let err = match outcome {
                Ok(Ok(transport)) => return self.install(transport, endpoint, start_epoch).await,
                Ok(Err(e)) => e,
                Err(_) => LifeGameError::ConnectionTimeout {
                    endpoint: endpoint.clone(),
                },
            };
            warn!(endpoint = %endpoint, "connect attempt failed: {err}");
            last_error = Some(err);
        }

        if matches!(cancel_rx.has_changed(), Ok(true)) {
            return Err(cancelled());
        }
        shared.set_state(ConnectionState::Failed);

        let report = probe_hosts(
            &self.inner.probe_hosts,
            self.inner.probe_port,
            self.inner.probe_timeout,
        )
        .await;
        error!("all endpoints failed\n{report}");

        let err = LifeGameError::AllEndpointsExhausted {
            report,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        };
        shared.events.emit_error(&err);
        Err(err)
    }

    /// Start the session loop for a handshaken transport, unless a
    /// `disconnect` slipped in since the connect began.
    async fn install(
        &self,
        transport: Box<dyn Transport>,
        endpoint: &str,
        start_epoch: u64,
    ) -> Result<String> {
        let shared = &self.inner.shared;
        let stale = {
            let mut slot = self.slot();
            if *self.inner.cancel_tx.borrow() == start_epoch {
                let generation = shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
                let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let task = tokio::spawn(session_loop(
                    transport,
                    cmd_rx,
                    shutdown_rx,
                    Arc::clone(shared),
                    generation,
                ));
                let previous = slot.replace(Session {
                    endpoint: endpoint.to_string(),
                    cmd_tx,
                    shutdown_tx: Some(shutdown_tx),
                    task,
                });
                if let Some(previous) = previous {
                    previous.task.abort();
                }
                // Publish under the lock so a concurrent disconnect sees a
                // consistent state.
                shared.set_state(ConnectionState::Connected);
                None
            } else {
                Some(transport)
            }
        };

        if let Some(mut transport) = stale {
            debug!(endpoint = %endpoint, "connect cancelled after handshake");
            let _ = transport.close().await;
            return Err(cancelled());
        }

        info!(endpoint = %endpoint, "STOMP session established");
        shared.events.emit(LifeGameEvent::Connected {
            endpoint: endpoint.to_string(),
        });
        Ok(endpoint.to_string())
    }

    /// Queue a JSON body for `destination`.
    ///
    /// # Errors
    ///
    /// [`LifeGameError::NotConnected`] if no session is live. Failures after
    /// queuing are reported as events.
    pub fn send(&self, destination: &str, body: impl Into<String>) -> Result<()> {
        self.command(SessionCommand::Send {
            destination: destination.to_string(),
            body: body.into(),
        })
    }

    /// Subscribe to `topic` on the live session.
    ///
    /// # Errors
    ///
    /// [`LifeGameError::NotConnected`] if no session is live.
    pub fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let id = format!("sub-{}", Uuid::new_v4());
        let (tx, rx) = mpsc::unbounded_channel();
        self.command(SessionCommand::Subscribe {
            id: id.clone(),
            destination: topic.to_string(),
            tx,
        })?;
        debug!(topic = %topic, id = %id, "subscribed");
        Ok(Subscription {
            id,
            topic: topic.to_string(),
            rx,
        })
    }

    /// Close the session, or cancel a connect in progress. Idempotent.
    ///
    /// Waits up to the configured shutdown timeout for the session loop to
    /// send `DISCONNECT` and close the transport, then aborts it.
    pub async fn disconnect(&self) {
        let session = {
            let mut slot = self.slot();
            self.inner
                .cancel_tx
                .send_modify(|epoch| *epoch = epoch.wrapping_add(1));
            slot.take()
        };
        let shared = &self.inner.shared;

        if let Some(mut session) = session {
            debug!(endpoint = %session.endpoint, "disconnect requested");
            if let Some(tx) = session.shutdown_tx.take() {
                let _ = tx.send(());
            }
            match tokio::time::timeout(self.inner.shutdown_timeout, &mut session.task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("session loop terminated with join error: {join_err}"),
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    session.task.abort();
                    if let Err(join_err) = session.task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                    shared.set_state(ConnectionState::Disconnected);
                    shared
                        .events
                        .emit_disconnected(Some("client shut down".into()))
                        .await;
                }
            }
        }
        shared.set_state(ConnectionState::Disconnected);
    }

    /// Current connection state.
    pub fn current_state(&self) -> ConnectionState {
        *self.inner.shared.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state_tx.subscribe()
    }

    /// Endpoint of the live session, if any.
    pub fn endpoint(&self) -> Option<String> {
        if self.current_state() != ConnectionState::Connected {
            return None;
        }
        self.slot()
            .as_ref()
            .filter(|s| !s.cmd_tx.is_closed())
            .map(|s| s.endpoint.clone())
    }

    /// Whether a session loop is live.
    pub fn is_connected(&self) -> bool {
        self.endpoint().is_some()
    }

    /// Counter that changes with every established session.
    pub(crate) fn generation(&self) -> u64 {
        self.inner.shared.generation.load(Ordering::Acquire)
    }

    fn command(&self, cmd: SessionCommand) -> Result<()> {
        if self.current_state() != ConnectionState::Connected {
            return Err(LifeGameError::NotConnected);
        }
        match self.slot().as_ref() {
            Some(session) => session
                .cmd_tx
                .send(cmd)
                .map_err(|_| LifeGameError::NotConnected),
            None => Err(LifeGameError::NotConnected),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Session>> {
        match self.inner.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.current_state())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

fn cancelled() -> LifeGameError {
    debug!("connect cancelled by disconnect");
    LifeGameError::TransportClosed
}

/// Open a transport and complete the STOMP handshake.
async fn open_session(connector: &dyn Connector, endpoint: &str) -> Result<Box<dyn Transport>> {
    let mut transport = connector.connect(endpoint).await?;
    match handshake(transport.as_mut(), endpoint).await {
        Ok(()) => Ok(transport),
        Err(e) => {
            let _ = transport.close().await;
            Err(e)
        }
    }
}

async fn handshake(transport: &mut dyn Transport, endpoint: &str) -> Result<()> {
    transport
        .send(Frame::connect(virtual_host(endpoint)).encode())
        .await?;

    loop {
        let text = match transport.recv().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => return Err(LifeGameError::TransportClosed),
        };
        let Some(frame) = Frame::parse(&text)? else {
            continue;
        };
        match frame.command {
            Command::Connected => {
                debug!(
                    endpoint = %endpoint,
                    version = frame.header("version").unwrap_or("1.0"),
                    "STOMP CONNECTED"
                );
                return Ok(());
            }
            Command::Error => return Err(broker_error(&frame)),
            other => debug!("ignoring {other} frame during handshake"),
        }
    }
}

/// Host part of a `ws://host:port/path` URI, used as the STOMP virtual host.
fn virtual_host(endpoint: &str) -> &str {
    let rest = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

fn broker_error(frame: &Frame) -> LifeGameError {
    let message = frame
        .header("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.trim().to_string());
    LifeGameError::Broker { message }
}

/// Where `MESSAGE` frames for one subscription go.
struct Route {
    destination: String,
    tx: mpsc::UnboundedSender<String>,
}

/// Background loop that owns the transport for one session.
///
/// Exits when the handle asks it to, the transport ends or fails, or the
/// broker sends `ERROR`. Dropping the routes on exit ends every subscription.
async fn session_loop(
    mut transport: Box<dyn Transport>,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    mut shutdown_rx: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    generation: u64,
) {
    debug!(generation, "session loop started");
    let mut routes: HashMap<String, Route> = HashMap::new();

    let reason = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("command channel closed, shutting down session loop");
                    close_gracefully(transport.as_mut()).await;
                    break Some("client shut down".to_string());
                };
                let frame = match cmd {
                    SessionCommand::Send { destination, body } => {
                        debug!(destination = %destination, "SEND");
                        Frame::send(&destination, body)
                    }
                    SessionCommand::Subscribe { id, destination, tx } => {
                        let frame = Frame::subscribe(&id, &destination);
                        routes.insert(id, Route { destination, tx });
                        frame
                    }
                };
                if let Err(e) = transport.send(frame.encode()).await {
                    error!("transport send error: {e}");
                    shared.events.emit_error(&LifeGameError::TransportSend(e.to_string()));
                    break Some(format!("transport send error: {e}"));
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                close_gracefully(transport.as_mut()).await;
                break Some("client shut down".to_string());
            }

            incoming = transport.recv() => {
                let text = match incoming {
                    Some(Ok(text)) => text,
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break Some(format!("transport receive error: {e}"));
                    }
                    None => {
                        debug!("transport closed by server");
                        break None;
                    }
                };
                let frame = match Frame::parse(&text) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("dropping malformed frame: {e}, raw: {text:?}");
                        shared.events.emit_error(&e);
                        continue;
                    }
                };
                match frame.command {
                    Command::Message => {
                        if let Err(e) = deliver(&mut routes, frame, transport.as_mut()).await {
                            error!("transport send error: {e}");
                            shared.events.emit_error(&e);
                            break Some(format!("transport send error: {e}"));
                        }
                    }
                    Command::Error => {
                        let err = broker_error(&frame);
                        error!("{err}");
                        shared.events.emit_error(&err);
                        let _ = transport.close().await;
                        break Some(err.to_string());
                    }
                    other => debug!("ignoring {other} frame"),
                }
            }
        }
    };

    drop(routes);
    shared.session_ended(generation, reason).await;
    debug!(generation, "session loop exited");
}

/// Hand a `MESSAGE` body to its subscription. Unsubscribes when the
/// receiving side has been dropped.
async fn deliver(
    routes: &mut HashMap<String, Route>,
    frame: Frame,
    transport: &mut dyn Transport,
) -> Result<()> {
    let id = match frame.header("subscription") {
        Some(id) if routes.contains_key(id) => Some(id.to_string()),
        _ => {
            let destination = frame.header("destination").unwrap_or_default();
            routes
                .iter()
                .find(|(_, route)| route.destination == destination)
                .map(|(id, _)| id.clone())
        }
    };
    let Some(id) = id else {
        debug!(
            destination = frame.header("destination").unwrap_or_default(),
            "MESSAGE for unknown subscription"
        );
        return Ok(());
    };

    let closed = match routes.get(&id) {
        Some(route) => route.tx.send(frame.body).is_err(),
        None => false,
    };
    if closed {
        if let Some(route) = routes.remove(&id) {
            debug!(topic = %route.destination, "subscriber gone, unsubscribing");
        }
        transport.send(Frame::unsubscribe(&id).encode()).await?;
    }
    Ok(())
}

async fn close_gracefully(transport: &mut dyn Transport) {
    if let Err(e) = transport.send(Frame::disconnect().encode()).await {
        debug!("DISCONNECT not sent: {e}");
    }
    if let Err(e) = transport.close().await {
        debug!("transport close failed: {e}");
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::net::TcpListener;

    /// Transport that answers `CONNECT` and records every client frame.
    struct LoopbackBroker {
        inbound: mpsc::UnboundedReceiver<String>,
        reply: mpsc::WeakUnboundedSender<String>,
        seen: mpsc::UnboundedSender<Frame>,
    }

    #[async_trait]
    impl Transport for LoopbackBroker {
        async fn send(&mut self, frame: String) -> Result<()> {
            let parsed = Frame::parse(&frame)?.unwrap();
            if parsed.command == Command::Connect {
                if let Some(reply) = self.reply.upgrade() {
                    let _ = reply.send(
                        Frame::new(Command::Connected)
                            .with_header("version", "1.2")
                            .encode(),
                    );
                }
            }
            let _ = self.seen.send(parsed);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            self.inbound.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<()> {
            self.inbound.close();
            Ok(())
        }
    }

    struct BrokerHandle {
        push: mpsc::UnboundedSender<String>,
        seen: mpsc::UnboundedReceiver<Frame>,
    }

    impl BrokerHandle {
        async fn next_frame(&mut self, command: Command) -> Frame {
            loop {
                let frame = tokio::time::timeout(Duration::from_secs(2), self.seen.recv())
                    .await
                    .expect("timed out waiting for frame")
                    .expect("broker dropped");
                if frame.command == command {
                    return frame;
                }
            }
        }
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Accept,
        Refuse,
        Hang,
    }

    struct TestConnector {
        behaviours: HashMap<String, Behaviour>,
        brokers: Mutex<Vec<BrokerHandle>>,
    }

    impl TestConnector {
        fn new(behaviours: &[(&str, Behaviour)]) -> Arc<Self> {
            Arc::new(Self {
                behaviours: behaviours
                    .iter()
                    .map(|(e, b)| ((*e).to_string(), *b))
                    .collect(),
                brokers: Mutex::new(Vec::new()),
            })
        }

        fn take_broker(&self) -> BrokerHandle {
            self.brokers.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl Connector for TestConnector {
        async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>> {
            match self.behaviours.get(endpoint).copied().unwrap_or(Behaviour::Refuse) {
                Behaviour::Accept => {
                    let (push, inbound) = mpsc::unbounded_channel();
                    let (seen_tx, seen) = mpsc::unbounded_channel();
                    let reply = push.downgrade();
                    self.brokers
                        .lock()
                        .unwrap()
                        .push(BrokerHandle { push, seen });
                    Ok(Box::new(LoopbackBroker {
                        inbound,
                        reply,
                        seen: seen_tx,
                    }))
                }
                Behaviour::Refuse => Err(LifeGameError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))),
                Behaviour::Hang => std::future::pending().await,
            }
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn manager(
        connector: Arc<TestConnector>,
    ) -> (ConnectionManager, mpsc::Receiver<LifeGameEvent>) {
        let config = LifeGameConfig::new("Alice", "1")
            .with_retry_backoff(Duration::from_millis(10))
            .with_probe_hosts(vec!["127.0.0.1".into()])
            .with_probe_port(closed_port().await)
            .with_probe_timeout(Duration::from_millis(200))
            .with_shutdown_timeout(Duration::from_millis(200));
        let (events, rx) = EventSink::channel(64);
        (ConnectionManager::new(connector, &config, events), rx)
    }

    fn endpoints(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn drain(rx: &mut mpsc::Receiver<LifeGameEvent>) -> Vec<LifeGameEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn empty_endpoint_list_is_rejected() {
        let (manager, _rx) = manager(TestConnector::new(&[])).await;
        let err = manager.connect(&[], Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, LifeGameError::InvalidCommandState(_)));
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn falls_over_to_next_endpoint() {
        let connector = TestConnector::new(&[("ws://a", Behaviour::Refuse), ("ws://b", Behaviour::Accept)]);
        let (manager, mut rx) = manager(Arc::clone(&connector)).await;

        let endpoint = manager
            .connect(&endpoints(&["ws://a", "ws://b", "ws://c"]), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(endpoint, "ws://b");
        assert_eq!(manager.current_state(), ConnectionState::Connected);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                LifeGameEvent::ConnectionStateChanged(ConnectionState::Connecting),
                LifeGameEvent::ConnectionStateChanged(ConnectionState::Connected),
                LifeGameEvent::Connected {
                    endpoint: "ws://b".into()
                },
            ]
        );

        let mut broker = connector.take_broker();
        let connect = broker.next_frame(Command::Connect).await;
        assert_eq!(connect.header("host"), Some("b"));
    }

    #[tokio::test]
    async fn hanging_endpoint_times_out() {
        let connector = TestConnector::new(&[("ws://slow", Behaviour::Hang), ("ws://ok", Behaviour::Accept)]);
        let (manager, _rx) = manager(connector).await;

        let started = tokio::time::Instant::now();
        let endpoint = manager
            .connect(&endpoints(&["ws://slow", "ws://ok"]), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(endpoint, "ws://ok");
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn exhaustion_reports_reachability() {
        let connector = TestConnector::new(&[]);
        let (manager, mut rx) = manager(connector).await;

        let err = manager
            .connect(&endpoints(&["ws://x", "ws://y"]), Duration::from_millis(100))
            .await
            .unwrap_err();
        let report = err.reachability().expect("report").clone();
        assert_eq!(report.hosts.len(), 1);
        assert!(!report.any_reachable());
        assert_eq!(manager.current_state(), ConnectionState::Failed);

        let events = drain(&mut rx);
        assert!(events.contains(&LifeGameEvent::ConnectionStateChanged(
            ConnectionState::Failed
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            LifeGameEvent::Error {
                code: crate::ErrorCode::AllEndpointsExhausted,
                reachability: Some(_),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn send_without_session_is_not_connected() {
        let (manager, _rx) = manager(TestConnector::new(&[])).await;
        assert!(matches!(
            manager.send("/app/chat", "{}"),
            Err(LifeGameError::NotConnected)
        ));
        assert!(matches!(
            manager.subscribe("/topic/game"),
            Err(LifeGameError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn messages_reach_their_subscription() {
        let connector = TestConnector::new(&[("ws://b", Behaviour::Accept)]);
        let (manager, _rx) = manager(Arc::clone(&connector)).await;
        manager
            .connect(&endpoints(&["ws://b"]), Duration::from_secs(1))
            .await
            .unwrap();
        let mut broker = connector.take_broker();

        let mut game = manager.subscribe("/topic/game").unwrap();
        let mut chat = manager.subscribe("/topic/chat").unwrap();
        let sub = broker.next_frame(Command::Subscribe).await;
        assert_eq!(sub.header("destination"), Some("/topic/game"));
        assert_eq!(sub.header("id"), Some(game.id()));
        broker.next_frame(Command::Subscribe).await;

        for body in ["1", "2"] {
            broker
                .push
                .send(Frame::message("/topic/game", game.id(), "m", body).encode())
                .unwrap();
        }
        broker
            .push
            .send(Frame::message("/topic/chat", chat.id(), "m", "hi").encode())
            .unwrap();

        assert_eq!(game.recv().await.as_deref(), Some("1"));
        assert_eq!(game.recv().await.as_deref(), Some("2"));
        assert_eq!(chat.recv().await.as_deref(), Some("hi"));

        manager.send("/app/chat", r#"{"x":1}"#).unwrap();
        let send = broker.next_frame(Command::Send).await;
        assert_eq!(send.header("destination"), Some("/app/chat"));
        assert_eq!(send.body, r#"{"x":1}"#);
    }

    #[tokio::test]
    async fn dropped_subscription_is_unsubscribed() {
        let connector = TestConnector::new(&[("ws://b", Behaviour::Accept)]);
        let (manager, _rx) = manager(Arc::clone(&connector)).await;
        manager
            .connect(&endpoints(&["ws://b"]), Duration::from_secs(1))
            .await
            .unwrap();
        let mut broker = connector.take_broker();

        let sub = manager.subscribe("/topic/lobby").unwrap();
        let id = sub.id().to_string();
        broker.next_frame(Command::Subscribe).await;
        drop(sub);

        broker
            .push
            .send(Frame::message("/topic/lobby", &id, "m", "{}").encode())
            .unwrap();
        let unsub = broker.next_frame(Command::Unsubscribe).await;
        assert_eq!(unsub.header("id"), Some(id.as_str()));
    }

    #[tokio::test]
    async fn transport_loss_ends_subscriptions() {
        let connector = TestConnector::new(&[("ws://b", Behaviour::Accept)]);
        let (manager, mut rx) = manager(Arc::clone(&connector)).await;
        manager
            .connect(&endpoints(&["ws://b"]), Duration::from_secs(1))
            .await
            .unwrap();
        let mut sub = manager.subscribe("/topic/game").unwrap();
        let broker = connector.take_broker();
        drain(&mut rx);

        // Dropping every sender ends the transport's inbound stream.
        drop(broker);
        let mut state = manager.state();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();

        assert_eq!(sub.recv().await, None);
        assert!(matches!(
            manager.send("/app/chat", "{}"),
            Err(LifeGameError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn broker_error_frame_ends_session() {
        let connector = TestConnector::new(&[("ws://b", Behaviour::Accept)]);
        let (manager, mut rx) = manager(Arc::clone(&connector)).await;
        manager
            .connect(&endpoints(&["ws://b"]), Duration::from_secs(1))
            .await
            .unwrap();
        let broker = connector.take_broker();
        drain(&mut rx);

        broker
            .push
            .send(
                Frame::new(Command::Error)
                    .with_header("message", "bad destination")
                    .encode(),
            )
            .unwrap();

        let mut saw_error = false;
        loop {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap() {
                Some(LifeGameEvent::Error { code, message, .. }) => {
                    assert_eq!(code, crate::ErrorCode::BrokerError);
                    assert!(message.contains("bad destination"));
                    saw_error = true;
                }
                Some(LifeGameEvent::Disconnected { .. }) => break,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
        assert!(saw_error);
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_sends_disconnect_frame() {
        let connector = TestConnector::new(&[("ws://b", Behaviour::Accept)]);
        let (manager, mut rx) = manager(Arc::clone(&connector)).await;
        manager
            .connect(&endpoints(&["ws://b"]), Duration::from_secs(1))
            .await
            .unwrap();
        let mut broker = connector.take_broker();

        manager.disconnect().await;
        broker.next_frame(Command::Disconnect).await;
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&LifeGameEvent::Disconnected {
                reason: Some("client shut down".into())
            })
        );

        // Second call is a no-op.
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_cancels_running_connect() {
        let connector = TestConnector::new(&[("ws://slow", Behaviour::Hang)]);
        let (manager, _rx) = manager(connector).await;

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .connect(&endpoints(&["ws://slow"]), Duration::from_secs(30))
                    .await
            })
        };
        let mut state = manager.state();
        state
            .wait_for(|s| *s == ConnectionState::Connecting)
            .await
            .unwrap();

        manager.disconnect().await;
        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(LifeGameError::TransportClosed)));
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn second_connect_returns_live_endpoint() {
        let connector = TestConnector::new(&[("ws://b", Behaviour::Accept)]);
        let (manager, _rx) = manager(Arc::clone(&connector)).await;
        let list = endpoints(&["ws://b"]);

        let (a, b) = tokio::join!(
            manager.connect(&list, Duration::from_secs(1)),
            manager.connect(&list, Duration::from_secs(1)),
        );
        assert_eq!(a.unwrap(), "ws://b");
        assert_eq!(b.unwrap(), "ws://b");
        assert_eq!(connector.brokers.lock().unwrap().len(), 1);
    }

    #[test]
    fn virtual_host_strips_scheme_port_and_path() {
        assert_eq!(virtual_host("ws://10.0.2.2:8080/websocket-broker"), "10.0.2.2");
        assert_eq!(virtual_host("wss://example.org/x"), "example.org");
        assert_eq!(virtual_host("ws://b"), "b");
    }
}
