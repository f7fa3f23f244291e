//! Wire-compatible message records for the Spiel des Lebens backend.
//!
//! Field names match the backend's JSON exactly (`camelCase`). Inbound records
//! are lenient: unknown fields are ignored and every field that the backend
//! has been seen to omit carries `#[serde(default)]`. Outbound records only
//! serialize what the backend expects.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Players are identified by their display name.
pub type PlayerId = String;

/// Board field index.
pub type FieldIndex = u32;

// ── Enums ───────────────────────────────────────────────────────────

/// Board field category.
///
/// Parsing never fails: unknown or empty strings fall back to
/// [`FieldType::Aktion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    #[default]
    Aktion,
    Zahltag,
    Freund,
    Haus,
    Beruf,
    Heirat,
    Kinder,
    Examen,
    Ruhestand,
}

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::Aktion,
        FieldType::Zahltag,
        FieldType::Freund,
        FieldType::Haus,
        FieldType::Beruf,
        FieldType::Heirat,
        FieldType::Kinder,
        FieldType::Examen,
        FieldType::Ruhestand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Aktion => "AKTION",
            FieldType::Zahltag => "ZAHLTAG",
            FieldType::Freund => "FREUND",
            FieldType::Haus => "HAUS",
            FieldType::Beruf => "BERUF",
            FieldType::Heirat => "HEIRAT",
            FieldType::Kinder => "KINDER",
            FieldType::Examen => "EXAMEN",
            FieldType::Ruhestand => "RUHESTAND",
        }
    }

    /// Lenient parse used for the `typeString` wire field.
    pub fn from_type_string(raw: &str) -> Self {
        let raw = raw.trim();
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == raw)
            .unwrap_or_default()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|s| FieldType::from_type_string(&s)).unwrap_or_default())
    }
}

/// Car color chosen by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarColor {
    Yellow,
    Red,
    Green,
    Blue,
}

impl CarColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarColor::Yellow => "YELLOW",
            CarColor::Red => "RED",
            CarColor::Green => "GREEN",
            CarColor::Blue => "BLUE",
        }
    }
}

impl FromStr for CarColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YELLOW" => Ok(CarColor::Yellow),
            "RED" => Ok(CarColor::Red),
            "GREEN" => Ok(CarColor::Green),
            "BLUE" => Ok(CarColor::Blue),
            other => Err(format!("unknown car color {other:?}")),
        }
    }
}

/// Coarse game status shown by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    #[default]
    Waiting,
    Connected,
    Running,
    Finished,
}

// ── Inbound records ─────────────────────────────────────────────────

/// Authoritative board state pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendGameState {
    #[serde(default)]
    pub player_positions: BTreeMap<PlayerId, FieldIndex>,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_player: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
}

/// Outcome of a move carried inside a [`GameActionResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResult {
    #[serde(default)]
    pub position: FieldIndex,
    #[serde(default)]
    pub requires_choice: bool,
    #[serde(default)]
    pub options: Vec<FieldIndex>,
}

/// Response to a game action; either part may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameActionResponse {
    #[serde(default)]
    pub game_state: Option<BackendGameState>,
    #[serde(default)]
    pub move_result: Option<MoveResult>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_true")]
    pub success: bool,
}

/// Single-player move broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMessage {
    pub player_name: PlayerId,
    pub field_index: FieldIndex,
    #[serde(default)]
    pub type_string: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_possible_fields: Vec<FieldIndex>,
}

impl MoveMessage {
    /// Players are keyed by name.
    pub fn player_id(&self) -> &str {
        &self.player_name
    }

    /// Parsed field type; a missing or unknown string is [`FieldType::Aktion`].
    pub fn field_type(&self) -> FieldType {
        FieldType::from_type_string(self.type_string.as_deref().unwrap_or_default())
    }
}

/// Generic per-player text output (chat, lobby notices, legacy moves).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMessage {
    pub player_name: PlayerId,
    #[serde(default)]
    pub position: Option<FieldIndex>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub options: Vec<FieldIndex>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Full lobby snapshot: up to four occupied slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyUpdate {
    #[serde(default)]
    pub player1: Option<String>,
    #[serde(default)]
    pub player2: Option<String>,
    #[serde(default)]
    pub player3: Option<String>,
    #[serde(default)]
    pub player4: Option<String>,
    #[serde(default)]
    pub is_started: Option<bool>,
    #[serde(default)]
    pub started: Option<bool>,
}

impl LobbyUpdate {
    /// Occupied slots in slot order; blank names are skipped.
    pub fn players(&self) -> Vec<PlayerId> {
        [&self.player1, &self.player2, &self.player3, &self.player4]
            .into_iter()
            .flatten()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// `Some(true)` if either start flag is set.
    pub fn started(&self) -> Option<bool> {
        match (self.is_started, self.started) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
        }
    }
}

/// Announces a single player, typically on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub player_name: PlayerId,
    #[serde(default)]
    pub color: Option<CarColor>,
}

/// Turn-order draft: player → claimed slot.
///
/// Slots are kept as sent; range checks happen when the draft is applied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOrderMessage {
    #[serde(default)]
    pub player_orders: BTreeMap<PlayerId, i64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_started: Option<bool>,
}

/// List of active player ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerListMessage {
    #[serde(default)]
    pub player_list: Vec<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl PlayerListMessage {
    /// Ids as strings; numeric ids are rendered in decimal.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.player_list
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()
    }
}

/// Structured game status, replacing the free-text status phrase.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatusMessage {
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// A job offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub salary: u32,
    #[serde(default)]
    pub bonus_salary: u32,
    #[serde(default)]
    pub requires_high_school_diploma: bool,
    #[serde(default)]
    pub is_taken: bool,
    #[serde(default)]
    pub taken_by_player_name: Option<String>,
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A house card; the German field names are the backend's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseMessage {
    #[serde(default)]
    pub house_id: Option<u32>,
    #[serde(default)]
    pub bezeichnung: String,
    #[serde(default)]
    pub kaufpreis: u32,
    #[serde(default)]
    pub verkaufspreis_rot: u32,
    #[serde(default)]
    pub verkaufspreis_schwarz: u32,
}

/// An action card with one or two choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCard {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
}

// ── Outbound records ────────────────────────────────────────────────

/// Lobby actions understood by `/app/lobby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LobbyAction {
    CreateLobby,
    JoinLobby,
    LeaveLobby,
}

/// Body for `/app/lobby`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyRequest {
    pub player_name: String,
    pub action: LobbyAction,
    pub game_id: String,
}

/// Body for the `/app/game/*` endpoints: identity plus one action field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameActionRequest {
    pub game_id: String,
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_field_index: Option<FieldIndex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_index: Option<FieldIndex>,
}

impl GameActionRequest {
    pub fn new(game_id: impl Into<String>, player_name: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            player_name: player_name.into(),
            start_field_index: None,
            steps: None,
            field_index: None,
        }
    }
}

/// Body for `/app/chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub player_name: String,
    pub message_text: String,
    pub game_id: String,
}

/// Body for the legacy `/app/move` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub player_name: String,
    pub action: String,
}

/// Body for `/app/getJob` and `/app/selectJob`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub player_name: String,
    pub game_id: String,
    pub has_degree: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<u32>,
}

/// Body for `/app/houses/finalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseSaleRequest {
    pub game_id: String,
    pub player_name: String,
    pub house: HouseMessage,
}

/// Body for the action-card endpoints; `choice` only when playing a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCardRequest {
    pub game_id: String,
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
}

/// Body for `/app/playerOrder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOrderRequest {
    pub game_id: String,
    pub player_name: String,
    pub position: u8,
}

/// Body for `/app/color`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorRequest {
    pub game_id: String,
    pub player_name: String,
    pub color: CarColor,
}

fn default_true() -> bool {
    true
}

/// `null` reads as the type's default, like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
