//! Topic subscriptions feeding the session state.
//!
//! Each routed topic gets one task that drains its [`Subscription`] in order,
//! decodes every body with the topic's decoder and folds the result into
//! [`SessionState`]. A payload that fails to decode is logged and reported as
//! an event; the task keeps going.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec::{self, DecodeError, InboundMessage};
use crate::connection::{ConnectionManager, Subscription};
use crate::error::{LifeGameError, Result};
use crate::event::EventSink;
use crate::protocol::PlayerId;
use crate::session::SessionState;

/// Server topics the client knows how to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Game action responses, moves and legacy move text.
    Game,
    /// Lobby-wide broadcasts.
    Lobby,
    /// Roster snapshots of one lobby.
    LobbyRoster(String),
    /// Start notifications of one lobby.
    GameStatus(String),
    Chat,
    Jobs,
    ActionCards { lobby_id: String, player: PlayerId },
    Houses { game_id: String, player: PlayerId },
    PlayerOrders,
    PlayerList,
}

impl Topic {
    /// STOMP destination of the topic.
    pub fn path(&self) -> String {
        match self {
            Topic::Game => "/topic/game".to_string(),
            Topic::Lobby => "/topic/lobby".to_string(),
            Topic::LobbyRoster(id) => format!("/topic/{id}"),
            Topic::GameStatus(id) => format!("/topic/game/{id}/status"),
            Topic::Chat => "/topic/chat".to_string(),
            Topic::Jobs => "/topic/getJob".to_string(),
            Topic::ActionCards { lobby_id, player } => {
                format!("/topic/actioncard/{lobby_id}/{player}")
            }
            Topic::Houses { game_id, player } => format!("/topic/houses/{game_id}/{player}"),
            Topic::PlayerOrders => "/topic/playerOrders".to_string(),
            Topic::PlayerList => "/topic/players".to_string(),
        }
    }

    /// Decode one body received on this topic.
    pub fn decode(&self, payload: &str) -> std::result::Result<Option<InboundMessage>, DecodeError> {
        match self {
            Topic::Game => codec::decode_game_topic(payload),
            Topic::GameStatus(_) => codec::decode_status(payload),
            Topic::Chat => codec::decode_chat(payload),
            Topic::Jobs => codec::decode_jobs(payload),
            Topic::ActionCards { .. } => codec::decode_action_card(payload),
            Topic::Houses { .. } => codec::decode_houses(payload),
            Topic::Lobby | Topic::LobbyRoster(_) | Topic::PlayerOrders | Topic::PlayerList => {
                codec::decode(payload)
            }
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

struct RouteTask {
    /// Session the subscription belongs to.
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns one consumer task per routed topic.
pub struct TopicRouter {
    connection: ConnectionManager,
    session: Arc<SessionState>,
    events: EventSink,
    tasks: Mutex<HashMap<String, RouteTask>>,
}

impl TopicRouter {
    pub fn new(connection: ConnectionManager, session: Arc<SessionState>, events: EventSink) -> Self {
        Self {
            connection,
            session,
            events,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to `topic` and start its consumer task.
    ///
    /// A no-op while a task for the same path is alive on the current
    /// session. After a reconnect the topic is subscribed again.
    ///
    /// # Errors
    ///
    /// [`LifeGameError::NotConnected`] without a live session.
    pub fn route(&self, topic: Topic) -> Result<()> {
        let path = topic.path();
        let generation = self.connection.generation();
        let mut tasks = self.tasks();

        if let Some(existing) = tasks.get(&path) {
            if existing.generation == generation && !existing.handle.is_finished() {
                debug!(topic = %path, "already routed");
                return Ok(());
            }
        }

        let subscription = self.connection.subscribe(&path)?;
        let handle = tokio::spawn(route_loop(
            topic,
            subscription,
            Arc::clone(&self.session),
            self.events.clone(),
        ));
        if let Some(previous) = tasks.insert(path, RouteTask { generation, handle }) {
            previous.handle.abort();
        }
        Ok(())
    }

    /// Whether a consumer task for `topic` is running.
    pub fn is_routed(&self, topic: &Topic) -> bool {
        self.tasks()
            .get(&topic.path())
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Abort every consumer task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks();
        for (path, task) in tasks.drain() {
            debug!(topic = %path, "stopping route");
            task.handle.abort();
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, RouteTask>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for TopicRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routed: Vec<String> = self.tasks().keys().cloned().collect();
        f.debug_struct("TopicRouter")
            .field("routed", &routed)
            .finish()
    }
}

async fn route_loop(
    topic: Topic,
    mut subscription: Subscription,
    session: Arc<SessionState>,
    events: EventSink,
) {
    debug!(topic = %topic, "route started");
    while let Some(body) = subscription.recv().await {
        match topic.decode(&body) {
            Ok(Some(message)) => session.apply(message),
            Ok(None) => debug!(topic = %topic, "blank payload ignored"),
            Err(e) => {
                warn!(topic = %topic, "undecodable payload: {e}, raw: {body}");
                events.emit_error(&LifeGameError::Decode(e));
            }
        }
    }
    debug!(topic = %topic, "route ended");
}
