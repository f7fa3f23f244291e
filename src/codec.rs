//! Shape discrimination for inbound payloads.
//!
//! The backend does not tag most of its messages, so the decoder first looks
//! for an explicit `type` field and otherwise falls back to guessing the shape
//! from which keys are present. Blank payloads are a no-op (`Ok(None)`), never
//! an error.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::{
    ActionCard, GameActionResponse, GameStatusMessage, HouseMessage, JobMessage, LobbyUpdate,
    MoveMessage, OutputMessage, PlayerListMessage, PlayerOrderMessage, PlayerUpdate,
};

/// Phrase the legacy status topic sends once a lobby's game has begun.
pub const GAME_STARTED_PHRASE: &str = "Spiel wurde gestartet";

/// Why a payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    /// No known message has this combination of keys.
    #[error("unrecognized message shape (keys: {keys:?})")]
    UnknownShape { keys: Vec<String> },

    /// The shape was recognized but its fields did not fit.
    #[error("malformed {shape}: {reason}")]
    InvalidShape { shape: &'static str, reason: String },
}

/// A decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    GameAction(GameActionResponse),
    Move(MoveMessage),
    Roster(LobbyUpdate),
    PlayerOrders(PlayerOrderMessage),
    PlayerList(PlayerListMessage),
    PlayerUpdate(PlayerUpdate),
    Output(OutputMessage),
    Chat(OutputMessage),
    GameStatus(GameStatusMessage),
    Jobs(Vec<JobMessage>),
    Houses(Vec<HouseMessage>),
    ActionCard(ActionCard),
}

impl InboundMessage {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::GameAction(_) => "gameAction",
            InboundMessage::Move(_) => "move",
            InboundMessage::Roster(_) => "lobbyUpdate",
            InboundMessage::PlayerOrders(_) => "playerOrders",
            InboundMessage::PlayerList(_) => "players",
            InboundMessage::PlayerUpdate(_) => "playerUpdate",
            InboundMessage::Output(_) => "output",
            InboundMessage::Chat(_) => "chat",
            InboundMessage::GameStatus(_) => "gameStatus",
            InboundMessage::Jobs(_) => "jobs",
            InboundMessage::Houses(_) => "houses",
            InboundMessage::ActionCard(_) => "actionCard",
        }
    }
}

/// Decode a payload from a general-purpose topic.
pub fn decode(payload: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let Some(value) = parse_json(payload)? else {
        return Ok(None);
    };
    decode_value(value).map(Some)
}

/// Decode a payload from the game topic, which carries three shapes.
///
/// Tries a game action response, then a move message, then an output message.
pub fn decode_game_topic(payload: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let Some(value) = parse_json(payload)? else {
        return Ok(None);
    };
    let map = as_object(&value)?;
    if let Some(decoded) = decode_tagged(map, &value)? {
        return Ok(Some(decoded));
    }

    if map.contains_key("gameState") || map.contains_key("moveResult") {
        if let Ok(response) = serde_json::from_value(value.clone()) {
            return Ok(Some(InboundMessage::GameAction(response)));
        }
    }
    if let Ok(movement) = serde_json::from_value(value.clone()) {
        return Ok(Some(InboundMessage::Move(movement)));
    }
    if let Ok(output) = serde_json::from_value(value.clone()) {
        return Ok(Some(InboundMessage::Output(output)));
    }
    Err(unknown_shape(map))
}

/// Decode a chat payload.
pub fn decode_chat(payload: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let Some(value) = parse_json(payload)? else {
        return Ok(None);
    };
    as_object(&value)?;
    typed("chat message", value).map(|m| Some(InboundMessage::Chat(m)))
}

/// Decode a status payload: structured JSON or the legacy free-text phrase.
pub fn decode_status(payload: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let text = payload.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let status = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => status_from_object(&map),
        Ok(Value::String(s)) => status_from_text(&s),
        _ => status_from_text(text),
    };
    Ok(Some(InboundMessage::GameStatus(status)))
}

/// Decode a job offer: a single job, an array, or `{"jobs": [...]}`.
pub fn decode_jobs(payload: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let Some(value) = parse_json(payload)? else {
        return Ok(None);
    };
    list_or_single("job", "jobs", value).map(|jobs| Some(InboundMessage::Jobs(jobs)))
}

/// Decode house offers: an array, a single house, or `{"houses": [...]}`.
pub fn decode_houses(payload: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let Some(value) = parse_json(payload)? else {
        return Ok(None);
    };
    list_or_single("house", "houses", value).map(|houses| Some(InboundMessage::Houses(houses)))
}

/// Decode a drawn action card.
pub fn decode_action_card(payload: &str) -> Result<Option<InboundMessage>, DecodeError> {
    let Some(value) = parse_json(payload)? else {
        return Ok(None);
    };
    as_object(&value)?;
    typed("action card", value).map(|card| Some(InboundMessage::ActionCard(card)))
}

fn parse_json(payload: &str) -> Result<Option<Value>, DecodeError> {
    if payload.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, DecodeError> {
    value.as_object().ok_or(DecodeError::NotAnObject)
}

fn typed<T: DeserializeOwned>(shape: &'static str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::InvalidShape {
        shape,
        reason: e.to_string(),
    })
}

fn unknown_shape(map: &Map<String, Value>) -> DecodeError {
    DecodeError::UnknownShape {
        keys: map.keys().cloned().collect(),
    }
}

fn decode_value(value: Value) -> Result<InboundMessage, DecodeError> {
    let map = as_object(&value)?;
    if let Some(decoded) = decode_tagged(map, &value)? {
        return Ok(decoded);
    }
    decode_legacy(map, value.clone())
}

/// Explicit `type` discriminator. Unknown tags return `Ok(None)` so the
/// caller can fall back to the key heuristic.
fn decode_tagged(
    map: &Map<String, Value>,
    value: &Value,
) -> Result<Option<InboundMessage>, DecodeError> {
    let Some(tag) = map.get("type").and_then(Value::as_str) else {
        return Ok(None);
    };
    let value = value.clone();
    let decoded = match tag {
        "gameAction" => InboundMessage::GameAction(typed("game action response", value)?),
        "move" => InboundMessage::Move(typed("move message", value)?),
        "lobbyUpdate" => InboundMessage::Roster(typed("lobby update", value)?),
        "playerOrders" => InboundMessage::PlayerOrders(typed("player order message", value)?),
        "players" => InboundMessage::PlayerList(typed("player list", value)?),
        "playerUpdate" => InboundMessage::PlayerUpdate(typed("player update", value)?),
        "output" => InboundMessage::Output(typed("output message", value)?),
        "gameStatus" => InboundMessage::GameStatus(status_from_object(map)),
        "job" => InboundMessage::Jobs(vec![typed("job", value)?]),
        "jobs" => InboundMessage::Jobs(list_or_single("job", "jobs", value)?),
        "houses" => InboundMessage::Houses(list_or_single("house", "houses", value)?),
        "actionCard" => InboundMessage::ActionCard(typed("action card", value)?),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

fn decode_legacy(map: &Map<String, Value>, value: Value) -> Result<InboundMessage, DecodeError> {
    let has = |key: &str| map.contains_key(key);

    if has("gameState") || has("moveResult") {
        return typed("game action response", value).map(InboundMessage::GameAction);
    }
    if has("playerOrders") {
        return typed("player order message", value).map(InboundMessage::PlayerOrders);
    }
    if ["player1", "player2", "player3", "player4"]
        .iter()
        .any(|k| has(k))
    {
        return typed("lobby update", value).map(InboundMessage::Roster);
    }
    if has("fieldIndex") {
        return typed("move message", value).map(InboundMessage::Move);
    }
    if has("playerList") {
        return typed("player list", value).map(InboundMessage::PlayerList);
    }
    if has("playerName") {
        if has("content") || has("position") {
            return typed("output message", value).map(InboundMessage::Output);
        }
        return typed("player update", value).map(InboundMessage::PlayerUpdate);
    }
    Err(unknown_shape(map))
}

fn list_or_single<T: DeserializeOwned>(
    shape: &'static str,
    list_key: &str,
    value: Value,
) -> Result<Vec<T>, DecodeError> {
    match value {
        Value::Array(_) => typed(shape, value),
        Value::Object(mut map) => match map.remove(list_key) {
            Some(list @ Value::Array(_)) => typed(shape, list),
            Some(_) => Err(DecodeError::InvalidShape {
                shape,
                reason: format!("`{list_key}` is not an array"),
            }),
            None => typed(shape, Value::Object(map)).map(|one| vec![one]),
        },
        _ => Err(DecodeError::NotAnObject),
    }
}

fn status_from_object(map: &Map<String, Value>) -> GameStatusMessage {
    let message = map
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    let flagged = |key: &str| match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("started")
                || s.eq_ignore_ascii_case("running")
                || s.contains(GAME_STARTED_PHRASE)
        }
        _ => false,
    };
    let started = flagged("started")
        || flagged("gameStatus")
        || message
            .as_deref()
            .is_some_and(|m| m.contains(GAME_STARTED_PHRASE));
    GameStatusMessage { started, message }
}

fn status_from_text(text: &str) -> GameStatusMessage {
    GameStatusMessage {
        started: text.contains(GAME_STARTED_PHRASE),
        message: Some(text.to_string()),
    }
}
