//! High-level client wiring the connection, router, session state and
//! command gateway together.
//!
//! [`LifeGameClient`] is created with [`LifeGameClient::start`], which returns
//! the handle and a bounded event receiver. Nothing touches the network until
//! [`connect`](LifeGameClient::connect) is called.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = LifeGameConfig::new("Alice", "1234");
//! let (client, mut events) = LifeGameClient::start(config, WebSocketConnector::new());
//!
//! client.connect().await?;
//! client.gateway().join_lobby("1234");
//! client.observe_lobby("1234")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         LifeGameEvent::ChoiceRequired { player, options } => { /* … */ }
//!         LifeGameEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::LifeGameConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::Result;
use crate::event::{EventSink, LifeGameEvent};
use crate::gateway::CommandGateway;
use crate::router::{Topic, TopicRouter};
use crate::session::SessionState;
use crate::transport::Connector;

/// Handle to one game session.
pub struct LifeGameClient {
    config: LifeGameConfig,
    connection: ConnectionManager,
    session: Arc<SessionState>,
    router: TopicRouter,
    gateway: CommandGateway,
}

impl LifeGameClient {
    /// Build the client and return it with its event receiver.
    ///
    /// The receiver yields [`LifeGameEvent`]s for the lifetime of the client.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        config: LifeGameConfig,
        connector: impl Connector,
    ) -> (Self, mpsc::Receiver<LifeGameEvent>) {
        let (events, event_rx) = EventSink::channel(config.event_channel_capacity);

        let connection = ConnectionManager::new(Arc::new(connector), &config, events.clone());
        let session = Arc::new(SessionState::new(config.player_name.clone(), events.clone()));
        let router = TopicRouter::new(connection.clone(), Arc::clone(&session), events.clone());
        let gateway = CommandGateway::new(
            connection.clone(),
            Arc::clone(&session),
            events,
            config.player_name.clone(),
            config.game_id.clone(),
        );

        let client = Self {
            config,
            connection,
            session,
            router,
            gateway,
        };
        (client, event_rx)
    }

    /// Connect to the first reachable endpoint and route the game, lobby and
    /// chat topics.
    ///
    /// On a fresh connection the snapshot is reset to a placeholder with the
    /// local player on the start field.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`].
    pub async fn connect(&self) -> Result<String> {
        let was_connected = self.connection.is_connected();
        let endpoint = self
            .connection
            .connect(&self.config.endpoints, self.config.connect_timeout)
            .await?;

        if !was_connected {
            self.session.apply_placeholder();
        }
        for topic in [Topic::Game, Topic::Lobby, Topic::Chat] {
            self.router.route(topic)?;
        }
        Ok(endpoint)
    }

    /// Follow the roster and start status of lobby `lobby_id`, and remember it
    /// as the lobby to start.
    ///
    /// # Errors
    ///
    /// [`LifeGameError::NotConnected`](crate::LifeGameError::NotConnected)
    /// without a live session.
    pub fn observe_lobby(&self, lobby_id: &str) -> Result<()> {
        self.router.route(Topic::LobbyRoster(lobby_id.to_string()))?;
        self.router.route(Topic::GameStatus(lobby_id.to_string()))?;
        self.gateway.set_lobby_id(lobby_id);
        debug!(lobby = %lobby_id, "observing lobby");
        Ok(())
    }

    /// Follow the turn-order draft and the active player list.
    ///
    /// # Errors
    ///
    /// As for [`observe_lobby`](Self::observe_lobby).
    pub fn observe_player_orders(&self) -> Result<()> {
        self.router.route(Topic::PlayerOrders)?;
        self.router.route(Topic::PlayerList)
    }

    /// Receive job offers as [`LifeGameEvent::JobOffers`].
    ///
    /// # Errors
    ///
    /// As for [`observe_lobby`](Self::observe_lobby).
    pub fn observe_jobs(&self) -> Result<()> {
        self.router.route(Topic::Jobs)
    }

    /// Receive the local player's action cards. Uses the joined lobby, or the
    /// configured game id before one is joined.
    ///
    /// # Errors
    ///
    /// As for [`observe_lobby`](Self::observe_lobby).
    pub fn observe_action_cards(&self) -> Result<()> {
        let lobby_id = self
            .gateway
            .lobby_id()
            .unwrap_or_else(|| self.config.game_id.clone());
        self.router.route(Topic::ActionCards {
            lobby_id,
            player: self.config.player_name.clone(),
        })
    }

    /// Receive house offers for the local player.
    ///
    /// # Errors
    ///
    /// As for [`observe_lobby`](Self::observe_lobby).
    pub fn observe_houses(&self) -> Result<()> {
        self.router.route(Topic::Houses {
            game_id: self.config.game_id.clone(),
            player: self.config.player_name.clone(),
        })
    }

    /// Stop every topic task and close the connection. Idempotent.
    pub async fn disconnect(&self) {
        debug!("LifeGameClient: disconnect requested");
        self.router.shutdown();
        self.connection.disconnect().await;
    }

    /// Outbound command sender.
    pub fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    /// Aggregated game state and its `watch` receivers.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Topic router owning the per-topic tasks.
    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Configuration the client was started with.
    pub fn config(&self) -> &LifeGameConfig {
        &self.config
    }

    /// Receiver observing every connection state transition.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state()
    }

    /// Whether a STOMP session is live.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}

impl std::fmt::Debug for LifeGameClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifeGameClient")
            .field("player", &self.config.player_name)
            .field("game_id", &self.config.game_id)
            .field("connection", &self.connection)
            .field("router", &self.router)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::LifeGameError;
    use crate::transport::Transport;
    use async_trait::async_trait;

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Transport>> {
            Err(LifeGameError::TransportClosed)
        }
    }

    #[tokio::test]
    async fn empty_endpoint_list_is_invalid() {
        let config = LifeGameConfig::new("Alice", "1").with_endpoints(Vec::new());
        let (client, _events) = LifeGameClient::start(config, RefusingConnector);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, LifeGameError::InvalidCommandState(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn observing_before_connect_fails() {
        let config = LifeGameConfig::new("Alice", "1");
        let (client, _events) = LifeGameClient::start(config, RefusingConnector);
        assert!(matches!(
            client.observe_lobby("5"),
            Err(LifeGameError::NotConnected)
        ));
        assert_eq!(client.gateway().lobby_id(), None);
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_harmless() {
        let config = LifeGameConfig::new("Alice", "1");
        let (client, _events) = LifeGameClient::start(config, RefusingConnector);
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(*client.connection_state().borrow(), ConnectionState::Disconnected);
    }
}
