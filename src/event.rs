//! Events delivered to the UI collaborator.
//!
//! Every component pushes onto one bounded channel through an [`EventSink`].
//! When the consumer falls behind, events are dropped with a warning so that
//! no background task ever blocks on the UI. [`LifeGameEvent::Disconnected`]
//! is the exception and is always delivered.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::ConnectionState;
use crate::diagnostics::ReachabilityReport;
use crate::error::LifeGameError;
use crate::error_codes::ErrorCode;
use crate::protocol::{ActionCard, FieldIndex, HouseMessage, JobMessage, OutputMessage, PlayerId};
use crate::session::{GameSnapshot, Player};

/// Something the UI may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum LifeGameEvent {
    /// The connection state machine moved.
    ConnectionStateChanged(ConnectionState),

    /// A STOMP session is established on `endpoint`.
    Connected { endpoint: String },

    /// The session ended, either on request or because the transport went away.
    Disconnected { reason: Option<String> },

    /// The board snapshot changed.
    GameStateUpdated(GameSnapshot),

    /// A player must pick their next field from `options`.
    ChoiceRequired {
        player: PlayerId,
        options: Vec<FieldIndex>,
    },

    /// Players dropped out of the lobby roster.
    PlayersRemoved(Vec<Player>),

    /// The lobby's game has started. Emitted once per session state.
    GameStarted,

    /// The turn-order draft changed.
    PlayerOrdersUpdated(BTreeMap<PlayerId, u8>),

    ChatReceived(OutputMessage),

    /// Free-text output that is not chat (lobby notices, legacy move text).
    LobbyNotice(OutputMessage),

    JobOffers(Vec<JobMessage>),

    ActionCardReceived(ActionCard),

    HouseOffers(Vec<HouseMessage>),

    /// The server answered a game action with `success: false`.
    ActionRejected { message: Option<String> },

    /// A recoverable failure. The session keeps running unless a
    /// `Disconnected` follows.
    Error {
        code: ErrorCode,
        message: String,
        /// Present when every endpoint failed to connect.
        reachability: Option<ReachabilityReport>,
    },
}

impl LifeGameEvent {
    /// Build an [`Error`](LifeGameEvent::Error) event from a crate error.
    pub fn from_error(err: &LifeGameError) -> Self {
        LifeGameEvent::Error {
            code: err.code(),
            message: err.to_string(),
            reachability: err.reachability().cloned(),
        }
    }
}

/// Cloneable sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<LifeGameEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<LifeGameEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiver. Capacity is clamped to 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LifeGameEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queue an event without waiting. Drops it if the channel is full.
    pub fn emit(&self, event: LifeGameEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Report an error as an [`Error`](LifeGameEvent::Error) event.
    pub fn emit_error(&self, err: &LifeGameError) {
        self.emit(LifeGameEvent::from_error(err));
    }

    /// Deliver a [`Disconnected`](LifeGameEvent::Disconnected) event, waiting
    /// for channel capacity if necessary.
    pub async fn emit_disconnected(&self, reason: Option<String>) {
        let event = LifeGameEvent::Disconnected { reason };
        if self.tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_channel_drops_regular_events() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(LifeGameEvent::GameStarted);
        sink.emit(LifeGameEvent::ActionRejected { message: None });

        assert_eq!(rx.recv().await, Some(LifeGameEvent::GameStarted));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnected_waits_for_capacity() {
        let (sink, mut rx) = EventSink::channel(1);
        sink.emit(LifeGameEvent::GameStarted);

        let mut send = tokio_test::task::spawn(sink.emit_disconnected(Some("bye".into())));
        tokio_test::assert_pending!(send.poll());

        assert_eq!(rx.try_recv().unwrap(), LifeGameEvent::GameStarted);
        assert!(send.is_woken());
        tokio_test::assert_ready!(send.poll());
        assert_eq!(
            rx.try_recv().unwrap(),
            LifeGameEvent::Disconnected {
                reason: Some("bye".into())
            }
        );
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (sink, _rx) = EventSink::channel(0);
        sink.emit(LifeGameEvent::GameStarted);
    }

    #[test]
    fn error_event_carries_code() {
        let event = LifeGameEvent::from_error(&LifeGameError::NotConnected);
        match event {
            LifeGameEvent::Error {
                code, reachability, ..
            } => {
                assert_eq!(code, ErrorCode::TransportSendFailure);
                assert!(reachability.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
