//! Outbound game commands.
//!
//! Every method builds the backend's JSON body, stamps it with the local
//! player name and game id, and queues it on the connection. Nothing waits
//! for a server answer. Failures never propagate to the caller: they are
//! logged and reported as [`LifeGameEvent::Error`](crate::LifeGameEvent::Error).
//! There are no retries.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::{LifeGameError, Result};
use crate::event::EventSink;
use crate::protocol::{
    ActionCardRequest, CarColor, ChatRequest, ColorRequest, FieldIndex, GameActionRequest,
    HouseMessage, HouseSaleRequest, JobRequest, LobbyAction, LobbyRequest, MoveRequest,
    PlayerOrderRequest,
};
use crate::session::{SessionState, MAX_TURN_SLOT};

pub const LOBBY_DESTINATION: &str = "/app/lobby";
pub const JOIN_GAME_DESTINATION: &str = "/app/game/joinGame";
pub const MOVE_PLAYER_DESTINATION: &str = "/app/game/movePlayer";
pub const CHOOSE_FIELD_DESTINATION: &str = "/app/game/chooseField";
pub const START_GAME_PREFIX: &str = "/app/game/start/";
pub const CHAT_DESTINATION: &str = "/app/chat";
pub const MOVE_DESTINATION: &str = "/app/move";
pub const REQUEST_JOBS_DESTINATION: &str = "/app/getJob";
pub const SELECT_JOB_DESTINATION: &str = "/app/selectJob";
pub const SELL_HOUSE_DESTINATION: &str = "/app/houses/finalize";
pub const DRAW_ACTION_CARD_DESTINATION: &str = "/app/actioncard/draw";
pub const PLAY_ACTION_CARD_DESTINATION: &str = "/app/actioncard/play";
pub const PLAYER_ORDER_DESTINATION: &str = "/app/playerOrder";
pub const COLOR_DESTINATION: &str = "/app/color";

/// Fire-and-forget command sender.
#[derive(Debug)]
pub struct CommandGateway {
    connection: ConnectionManager,
    session: Arc<SessionState>,
    events: EventSink,
    player_name: String,
    game_id: String,
    lobby_id: Mutex<Option<String>>,
}

impl CommandGateway {
    /// Gateway sending as `player_name` in game `game_id`.
    pub fn new(
        connection: ConnectionManager,
        session: Arc<SessionState>,
        events: EventSink,
        player_name: impl Into<String>,
        game_id: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            session,
            events,
            player_name: player_name.into(),
            game_id: game_id.into(),
            lobby_id: Mutex::new(None),
        }
    }

    /// Name stamped on every request.
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// Game id stamped on every request.
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Lobby joined most recently, if any.
    pub fn lobby_id(&self) -> Option<String> {
        self.lobby().clone()
    }

    /// Remember `id` as the current lobby without sending anything.
    pub fn set_lobby_id(&self, id: impl Into<String>) {
        *self.lobby() = Some(id.into());
    }

    // ── Lobby ───────────────────────────────────────────────────────

    /// Ask the server to open a lobby under this client's game id.
    pub fn create_lobby(&self) {
        self.lobby_request(LobbyAction::CreateLobby, self.game_id.clone());
    }

    /// Join lobby `id` and remember it for [`start_game`](Self::start_game).
    pub fn join_lobby(&self, id: &str) {
        if self.lobby_request(LobbyAction::JoinLobby, id.to_string()) {
            self.set_lobby_id(id);
        }
    }

    /// Leave the current lobby and forget its id once the request is queued.
    pub fn leave_lobby(&self) {
        let game_id = self.lobby_id().unwrap_or_else(|| self.game_id.clone());
        if self.lobby_request(LobbyAction::LeaveLobby, game_id) {
            *self.lobby() = None;
        }
    }

    /// Ask the server to start the joined lobby's game.
    ///
    /// Reports `InvalidCommandState` without sending anything when no lobby
    /// has been joined or its id is not numeric.
    pub fn start_game(&self) {
        let destination = match self.lobby_id() {
            None => Err(LifeGameError::InvalidCommandState(
                "cannot start a game before joining a lobby".into(),
            )),
            Some(id) if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) => Err(
                LifeGameError::InvalidCommandState(format!("lobby id {id:?} is not numeric")),
            ),
            Some(id) => Ok(format!("{START_GAME_PREFIX}{id}")),
        };
        let result = destination
            .and_then(|destination| self.connection.send(&destination, String::new()));
        self.report("start_game", result);
    }

    // ── Board ───────────────────────────────────────────────────────

    /// Place the local player on `start_field`.
    pub fn join_game(&self, start_field: FieldIndex) {
        let request = GameActionRequest {
            start_field_index: Some(start_field),
            ..self.game_action()
        };
        self.dispatch("join_game", JOIN_GAME_DESTINATION, &request);
    }

    /// Advance the local player by `steps` fields.
    pub fn move_player(&self, steps: u32) {
        let request = GameActionRequest {
            steps: Some(steps),
            ..self.game_action()
        };
        self.dispatch("move_player", MOVE_PLAYER_DESTINATION, &request);
    }

    /// Pick the next field. The local pending choice is cleared once the
    /// command is queued, whether or not the server accepts it.
    pub fn choose_field(&self, field: FieldIndex) {
        let local = self.player_name.as_str();
        if let Some(options) = self.session.pending_choice(local) {
            if !options.contains(&field) {
                debug!(field, ?options, "chosen field is not among the offered options");
            }
        }
        let request = GameActionRequest {
            field_index: Some(field),
            ..self.game_action()
        };
        if self.dispatch("choose_field", CHOOSE_FIELD_DESTINATION, &request) {
            self.session.clear_pending_choice(local);
        }
    }

    /// Legacy free-form move command.
    pub fn send_move(&self, action: &str) {
        let request = MoveRequest {
            player_name: self.player_name.clone(),
            action: action.to_string(),
        };
        self.dispatch("send_move", MOVE_DESTINATION, &request);
    }

    // ── Chat ────────────────────────────────────────────────────────

    /// Post `text` to the lobby chat.
    pub fn send_chat(&self, text: &str) {
        let request = ChatRequest {
            player_name: self.player_name.clone(),
            message_text: text.to_string(),
            game_id: self.game_id.clone(),
        };
        self.dispatch("send_chat", CHAT_DESTINATION, &request);
    }

    // ── Jobs, houses and action cards ───────────────────────────────

    /// Ask for job offers; `has_degree` unlocks academic jobs.
    pub fn request_jobs(&self, has_degree: bool) {
        let request = self.job_request(has_degree, None);
        self.dispatch("request_jobs", REQUEST_JOBS_DESTINATION, &request);
    }

    /// Accept the offered job `job_id`.
    pub fn select_job(&self, has_degree: bool, job_id: u32) {
        let request = self.job_request(has_degree, Some(job_id));
        self.dispatch("select_job", SELECT_JOB_DESTINATION, &request);
    }

    /// Finalize the sale of `house`.
    pub fn sell_house(&self, house: HouseMessage) {
        let request = HouseSaleRequest {
            game_id: self.game_id.clone(),
            player_name: self.player_name.clone(),
            house,
        };
        self.dispatch("sell_house", SELL_HOUSE_DESTINATION, &request);
    }

    /// Draw an action card. The card arrives on the action card topic.
    pub fn draw_action_card(&self) {
        let request = self.action_card_request(None);
        self.dispatch("draw_action_card", DRAW_ACTION_CARD_DESTINATION, &request);
    }

    /// Resolve the drawn card with `choice`.
    pub fn play_action_card(&self, choice: &str) {
        let request = self.action_card_request(Some(choice.to_string()));
        self.dispatch("play_action_card", PLAY_ACTION_CARD_DESTINATION, &request);
    }

    // ── Pre-game setup ──────────────────────────────────────────────

    /// Claim turn slot `slot` (1 to 4) in the player-order draft.
    ///
    /// Reports `InvalidCommandState` for an out-of-range slot or one already
    /// held by another player.
    pub fn claim_turn_slot(&self, slot: u8) {
        let result = if !(1..=MAX_TURN_SLOT).contains(&slot) {
            Err(LifeGameError::InvalidCommandState(format!(
                "turn slot {slot} is outside 1..={MAX_TURN_SLOT}"
            )))
        } else {
            match self.session.slot_claimant(slot) {
                Some(holder) if holder != self.player_name => Err(
                    LifeGameError::InvalidCommandState(format!(
                        "turn slot {slot} is already taken by {holder}"
                    )),
                ),
                _ => Ok(PlayerOrderRequest {
                    game_id: self.game_id.clone(),
                    player_name: self.player_name.clone(),
                    position: slot,
                }),
            }
        };
        match result {
            Ok(request) => {
                self.dispatch("claim_turn_slot", PLAYER_ORDER_DESTINATION, &request);
            }
            Err(e) => {
                self.report("claim_turn_slot", Err(e));
            }
        }
    }

    /// Pick a car color; recorded locally once queued.
    pub fn select_color(&self, color: CarColor) {
        let request = ColorRequest {
            game_id: self.game_id.clone(),
            player_name: self.player_name.clone(),
            color,
        };
        if self.dispatch("select_color", COLOR_DESTINATION, &request) {
            self.session.set_local_color(color);
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn lobby_request(&self, action: LobbyAction, game_id: String) -> bool {
        let request = LobbyRequest {
            player_name: self.player_name.clone(),
            action,
            game_id,
        };
        self.dispatch("lobby", LOBBY_DESTINATION, &request)
    }

    fn game_action(&self) -> GameActionRequest {
        GameActionRequest::new(self.game_id.clone(), self.player_name.clone())
    }

    fn job_request(&self, has_degree: bool, job_id: Option<u32>) -> JobRequest {
        JobRequest {
            player_name: self.player_name.clone(),
            game_id: self.game_id.clone(),
            has_degree,
            job_id,
        }
    }

    fn action_card_request(&self, choice: Option<String>) -> ActionCardRequest {
        ActionCardRequest {
            game_id: self.game_id.clone(),
            player_name: self.player_name.clone(),
            choice,
        }
    }

    /// Serialize and queue. Returns whether the command was queued.
    fn dispatch<T: Serialize>(&self, command: &'static str, destination: &str, body: &T) -> bool {
        let result = serde_json::to_string(body)
            .map_err(LifeGameError::from)
            .and_then(|json| self.connection.send(destination, json));
        if result.is_ok() {
            debug!(command, destination, "command queued");
        }
        self.report(command, result)
    }

    fn report(&self, command: &'static str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(command, "command not sent: {e}");
                self.events.emit_error(&e);
                false
            }
        }
    }

    fn lobby(&self) -> MutexGuard<'_, Option<String>> {
        match self.lobby_id.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::LifeGameConfig;
    use crate::error_codes::ErrorCode;
    use crate::event::LifeGameEvent;
    use crate::transport::{Connector, Transport};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;

    struct NoConnector;

    #[async_trait]
    impl Connector for NoConnector {
        async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Transport>> {
            Err(LifeGameError::TransportClosed)
        }
    }

    fn offline_gateway() -> (CommandGateway, mpsc::Receiver<LifeGameEvent>) {
        let config = LifeGameConfig::new("Alice", "7");
        let (events, rx) = EventSink::channel(16);
        let connection = ConnectionManager::new(Arc::new(NoConnector), &config, events.clone());
        let session = Arc::new(SessionState::new("Alice", events.clone()));
        (
            CommandGateway::new(connection, session, events, "Alice", "7"),
            rx,
        )
    }

    fn error_code(rx: &mut mpsc::Receiver<LifeGameEvent>) -> ErrorCode {
        match rx.try_recv().unwrap() {
            LifeGameEvent::Error { code, .. } => code,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn start_game_without_lobby_is_invalid() {
        let (gateway, mut rx) = offline_gateway();
        gateway.start_game();
        assert_eq!(error_code(&mut rx), ErrorCode::InvalidCommandState);
    }

    #[test]
    fn start_game_with_non_numeric_lobby_is_invalid() {
        let (gateway, mut rx) = offline_gateway();
        gateway.set_lobby_id("abc");
        gateway.start_game();
        assert_eq!(error_code(&mut rx), ErrorCode::InvalidCommandState);
    }

    #[test]
    fn commands_while_offline_report_send_failure() {
        let (gateway, mut rx) = offline_gateway();
        gateway.send_chat("hi");
        assert_eq!(error_code(&mut rx), ErrorCode::TransportSendFailure);

        gateway.join_lobby("12");
        assert_eq!(error_code(&mut rx), ErrorCode::TransportSendFailure);
        assert_eq!(gateway.lobby_id(), None);
    }

    #[test]
    fn turn_slot_bounds_are_checked() {
        let (gateway, mut rx) = offline_gateway();
        for slot in [0, 5] {
            gateway.claim_turn_slot(slot);
            assert_eq!(error_code(&mut rx), ErrorCode::InvalidCommandState);
        }
    }

    #[test]
    fn taken_turn_slot_is_rejected() {
        let (gateway, mut rx) = offline_gateway();
        gateway.session.apply_player_orders(crate::protocol::PlayerOrderMessage {
            player_orders: BTreeMap::from([("Bob".to_string(), 2)]),
            ..Default::default()
        });
        while rx.try_recv().is_ok() {}

        gateway.claim_turn_slot(2);
        assert_eq!(error_code(&mut rx), ErrorCode::InvalidCommandState);
    }

    #[test]
    fn failed_choose_field_keeps_pending_choice() {
        let (gateway, mut rx) = offline_gateway();
        gateway.session.apply_game_action(crate::protocol::GameActionResponse {
            game_state: None,
            move_result: Some(crate::protocol::MoveResult {
                position: 3,
                requires_choice: true,
                options: vec![4, 9],
            }),
            message: None,
            success: true,
        });
        while rx.try_recv().is_ok() {}

        gateway.choose_field(9);
        assert_eq!(error_code(&mut rx), ErrorCode::TransportSendFailure);
        assert_eq!(gateway.session.pending_choice("Alice"), Some(vec![4, 9]));
    }

    #[test]
    fn request_bodies_use_backend_field_names() {
        let request = GameActionRequest {
            steps: Some(3),
            ..GameActionRequest::new("7", "Alice")
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"gameId":"7","playerName":"Alice","steps":3})
        );

        let lobby = LobbyRequest {
            player_name: "Alice".into(),
            action: LobbyAction::CreateLobby,
            game_id: "7".into(),
        };
        assert_eq!(
            serde_json::to_value(&lobby).unwrap(),
            serde_json::json!({"playerName":"Alice","action":"createLobby","gameId":"7"})
        );
    }
}
