#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the integration tests.
//!
//! [`MockConnector`] plays a scripted behaviour per endpoint. Every accepted
//! connection is backed by an in-memory STOMP broker: it answers `CONNECT`
//! with `CONNECTED`, records every client frame, and lets the test publish
//! `MESSAGE` frames or drop the connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use lifegame_client::stomp::{Command, Frame};
use lifegame_client::{
    Connector, LifeGameClient, LifeGameConfig, LifeGameError, LifeGameEvent, Transport,
};
use tokio::sync::{mpsc, watch};

/// How long helpers wait before failing a test.
pub const WAIT: Duration = Duration::from_secs(2);

// ── MockConnector ───────────────────────────────────────────────────

/// What a connect attempt to an endpoint does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Open a transport backed by a fresh [`MockBroker`].
    Accept,
    /// Fail immediately with a refused I/O error.
    Refuse,
    /// Never complete, so the per-attempt timeout fires.
    Hang,
}

/// A connector with a scripted [`Behaviour`] per endpoint.
pub struct MockConnector {
    behaviours: HashMap<String, Behaviour>,
    fallback: Behaviour,
    attempts: Arc<StdMutex<Vec<String>>>,
    accepted: mpsc::UnboundedSender<MockBroker>,
}

/// Test-side view of a [`MockConnector`] after it moved into the client.
pub struct ConnectorHandle {
    attempts: Arc<StdMutex<Vec<String>>>,
    accepted: mpsc::UnboundedReceiver<MockBroker>,
}

impl MockConnector {
    /// Endpoints not listed use `fallback`.
    pub fn new(behaviours: &[(&str, Behaviour)], fallback: Behaviour) -> (Self, ConnectorHandle) {
        let attempts = Arc::new(StdMutex::new(Vec::new()));
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let connector = Self {
            behaviours: behaviours
                .iter()
                .map(|(endpoint, b)| ((*endpoint).to_string(), *b))
                .collect(),
            fallback,
            attempts: Arc::clone(&attempts),
            accepted: accepted_tx,
        };
        let handle = ConnectorHandle {
            attempts,
            accepted: accepted_rx,
        };
        (connector, handle)
    }

    /// Every endpoint accepts.
    pub fn accepting() -> (Self, ConnectorHandle) {
        Self::new(&[], Behaviour::Accept)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, LifeGameError> {
        self.attempts.lock().unwrap().push(endpoint.to_string());
        let behaviour = self
            .behaviours
            .get(endpoint)
            .copied()
            .unwrap_or(self.fallback);
        match behaviour {
            Behaviour::Accept => {
                let (broker, transport) = MockBroker::pair();
                let _ = self.accepted.send(broker);
                Ok(Box::new(transport))
            }
            Behaviour::Refuse => Err(LifeGameError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{endpoint} refused"),
            ))),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

impl ConnectorHandle {
    /// Endpoints attempted so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    /// Broker behind the next accepted connection.
    pub async fn next_broker(&mut self) -> MockBroker {
        tokio::time::timeout(WAIT, self.accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }
}

// ── MockBroker ──────────────────────────────────────────────────────

/// Test-side handle of one in-memory STOMP connection.
pub struct MockBroker {
    push: mpsc::UnboundedSender<Option<String>>,
    frames: Arc<watch::Sender<Vec<Frame>>>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    next_message_id: std::sync::atomic::AtomicU64,
}

impl MockBroker {
    fn pair() -> (Self, MockTransport) {
        let (push, inbound) = mpsc::unbounded_channel();
        let frames = Arc::new(watch::Sender::new(Vec::new()));
        let fail_sends = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = MockTransport {
            inbound,
            reply: push.downgrade(),
            frames: Arc::clone(&frames),
            fail_sends: Arc::clone(&fail_sends),
            closed: Arc::clone(&closed),
            ended: false,
        };
        let broker = Self {
            push,
            frames,
            fail_sends,
            closed,
            next_message_id: std::sync::atomic::AtomicU64::new(0),
        };
        (broker, transport)
    }

    /// Every frame the client sent, in order.
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.borrow().clone()
    }

    /// `SEND` frames addressed to `destination`.
    pub fn sent_to(&self, destination: &str) -> Vec<Frame> {
        self.frames()
            .into_iter()
            .filter(|f| f.command == Command::Send && f.header("destination") == Some(destination))
            .collect()
    }

    /// Number of `SUBSCRIBE` frames for `destination`.
    pub fn subscription_count(&self, destination: &str) -> usize {
        self.frames()
            .iter()
            .filter(|f| {
                f.command == Command::Subscribe && f.header("destination") == Some(destination)
            })
            .count()
    }

    /// Wait for the first client frame matching `pred`.
    pub async fn wait_for_frame(&self, pred: impl Fn(&Frame) -> bool) -> Frame {
        let mut rx = self.frames.subscribe();
        let found = tokio::time::timeout(WAIT, rx.wait_for(|frames| frames.iter().any(&pred)))
            .await
            .expect("timed out waiting for frame")
            .expect("broker dropped");
        found.iter().find(|f| pred(f)).cloned().expect("frame")
    }

    /// Wait until the client subscribed to `destination`; returns the id.
    pub async fn wait_for_subscription(&self, destination: &str) -> String {
        let frame = self
            .wait_for_frame(|f| {
                f.command == Command::Subscribe && f.header("destination") == Some(destination)
            })
            .await;
        frame.header("id").expect("subscription id").to_string()
    }

    /// Wait for a `SEND` to `destination`.
    pub async fn wait_for_sent(&self, destination: &str) -> Frame {
        self.wait_for_frame(|f| {
            f.command == Command::Send && f.header("destination") == Some(destination)
        })
        .await
    }

    /// Deliver `body` on `destination` to the most recent subscription.
    pub fn publish(&self, destination: &str, body: &str) {
        let subscription = self
            .frames()
            .iter()
            .rev()
            .find(|f| {
                f.command == Command::Subscribe && f.header("destination") == Some(destination)
            })
            .and_then(|f| f.header("id").map(str::to_string))
            .unwrap_or_default();
        let id = self
            .next_message_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let frame = Frame::message(destination, &subscription, &id, body);
        self.push.send(Some(frame.encode())).expect("transport gone");
    }

    /// Send an arbitrary raw text message to the client.
    pub fn push_raw(&self, text: &str) {
        self.push.send(Some(text.to_string())).expect("transport gone");
    }

    /// Drop the connection from the server side.
    pub fn disconnect_server(&self) {
        let _ = self.push.send(None);
    }

    /// Make every further client write fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::Release);
    }

    /// Whether the client closed the transport.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Client-side half of a [`MockBroker`].
struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Option<String>>,
    reply: mpsc::WeakUnboundedSender<Option<String>>,
    frames: Arc<watch::Sender<Vec<Frame>>>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    ended: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, text: String) -> Result<(), LifeGameError> {
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(LifeGameError::TransportSend("broken pipe".into()));
        }
        let Some(frame) = Frame::parse(&text)? else {
            return Ok(());
        };
        if frame.command == Command::Connect {
            if let Some(reply) = self.reply.upgrade() {
                let connected = Frame::new(Command::Connected).with_header("version", "1.2");
                let _ = reply.send(Some(connected.encode()));
            }
        }
        self.frames.send_modify(|frames| frames.push(frame));
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, LifeGameError>> {
        if self.ended {
            return None;
        }
        match self.inbound.recv().await {
            Some(Some(text)) => Some(Ok(text)),
            Some(None) | None => {
                self.ended = true;
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), LifeGameError> {
        self.closed.store(true, Ordering::Release);
        self.inbound.close();
        Ok(())
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// Three endpoints in the default order, with fake hosts.
pub fn endpoints() -> Vec<String> {
    vec![
        "ws://first:8080/websocket-broker".to_string(),
        "ws://second:8080/websocket-broker".to_string(),
        "ws://third:8080/websocket-broker".to_string(),
    ]
}

/// Config with short timeouts suitable for tests.
pub fn test_config(player: &str) -> LifeGameConfig {
    LifeGameConfig::new(player, "42")
        .with_endpoints(endpoints())
        .with_connect_timeout(Duration::from_millis(200))
        .with_retry_backoff(Duration::from_millis(10))
        .with_probe_hosts(vec!["127.0.0.1".into()])
        .with_probe_timeout(Duration::from_millis(200))
        .with_shutdown_timeout(Duration::from_millis(200))
}

/// Start a client for `player` against `connector`.
pub fn start_client(
    player: &str,
    connector: MockConnector,
) -> (LifeGameClient, mpsc::Receiver<LifeGameEvent>) {
    LifeGameClient::start(test_config(player), connector)
}

/// Receive events until one matches `pred`, returning it.
pub async fn wait_for_event(
    rx: &mut mpsc::Receiver<LifeGameEvent>,
    pred: impl Fn(&LifeGameEvent) -> bool,
) -> LifeGameEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Every event currently queued.
pub fn drain_events(rx: &mut mpsc::Receiver<LifeGameEvent>) -> Vec<LifeGameEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Wait until a `watch` value satisfies `pred`.
pub async fn wait_until<T>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) {
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state sender dropped");
}

/// Port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
