//! Session state aggregator.
//!
//! Folds decoded server messages into the local view of the game: lobby
//! roster, game-started flag, pending field choices, board snapshot and
//! turn-order draft. Every piece lives in a `watch` channel; the UI holds
//! receivers only and always sees the latest value on subscribe.
//!
//! Router tasks call [`SessionState::apply`] concurrently, one task per
//! topic. Each individual update is atomic; there is no ordering guarantee
//! across topics.

use std::collections::BTreeMap;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::codec::InboundMessage;
use crate::event::{EventSink, LifeGameEvent};
use crate::protocol::{
    CarColor, FieldIndex, GameActionResponse, GameStatus, MoveMessage, OutputMessage, PlayerId,
    PlayerOrderMessage,
};

/// Highest turn slot a player can claim.
pub const MAX_TURN_SLOT: u8 = 4;

/// Whether a player is still part of the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MembershipStatus {
    #[default]
    Active,
    Removed,
}

/// A participant as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: Option<CarColor>,
    pub field_index: FieldIndex,
    pub status: MembershipStatus,
}

impl Player {
    /// A new active player on the start field. The name doubles as the id.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            color: None,
            field_index: 0,
            status: MembershipStatus::Active,
        }
    }
}

/// Board positions plus whose turn it is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameSnapshot {
    pub positions: BTreeMap<PlayerId, FieldIndex>,
    pub current_player: Option<PlayerId>,
    pub status: GameStatus,
}

/// Aggregated session state. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct SessionState {
    local_player: PlayerId,
    events: EventSink,
    roster: watch::Sender<Vec<Player>>,
    started: watch::Sender<bool>,
    pending: watch::Sender<BTreeMap<PlayerId, Vec<FieldIndex>>>,
    snapshot: watch::Sender<GameSnapshot>,
    orders: watch::Sender<BTreeMap<PlayerId, u8>>,
}

impl SessionState {
    /// Empty state for `local_player`; changes are reported through `events`.
    pub fn new(local_player: impl Into<PlayerId>, events: EventSink) -> Self {
        Self {
            local_player: local_player.into(),
            events,
            roster: watch::Sender::new(Vec::new()),
            started: watch::Sender::new(false),
            pending: watch::Sender::new(BTreeMap::new()),
            snapshot: watch::Sender::new(GameSnapshot::default()),
            orders: watch::Sender::new(BTreeMap::new()),
        }
    }

    /// Name of the player this client acts for.
    pub fn local_player(&self) -> &str {
        &self.local_player
    }

    // ── Receivers ───────────────────────────────────────────────────

    /// Lobby roster in slot order.
    pub fn roster(&self) -> watch::Receiver<Vec<Player>> {
        self.roster.subscribe()
    }

    /// Flips to `true` once and stays there.
    pub fn game_started(&self) -> watch::Receiver<bool> {
        self.started.subscribe()
    }

    /// Open field choices per player.
    pub fn pending_choices(&self) -> watch::Receiver<BTreeMap<PlayerId, Vec<FieldIndex>>> {
        self.pending.subscribe()
    }

    /// Latest board snapshot.
    pub fn snapshot(&self) -> watch::Receiver<GameSnapshot> {
        self.snapshot.subscribe()
    }

    /// Turn-order draft, player to slot in `1..=4`.
    pub fn player_orders(&self) -> watch::Receiver<BTreeMap<PlayerId, u8>> {
        self.orders.subscribe()
    }

    // ── Point reads ─────────────────────────────────────────────────

    /// Whether the game has started.
    pub fn is_started(&self) -> bool {
        *self.started.borrow()
    }

    /// Fields `player` may pick from, if a choice is open.
    pub fn pending_choice(&self, player: &str) -> Option<Vec<FieldIndex>> {
        self.pending.borrow().get(player).cloned()
    }

    /// Player currently holding `slot` in the turn-order draft.
    pub fn slot_claimant(&self, slot: u8) -> Option<PlayerId> {
        self.orders
            .borrow()
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(player, _)| player.clone())
    }

    /// Roster entry for `id`.
    pub fn player(&self, id: &str) -> Option<Player> {
        self.roster.borrow().iter().find(|p| p.id == id).cloned()
    }

    // ── Merging ─────────────────────────────────────────────────────

    /// Fold one decoded message into the state and emit the matching events.
    pub fn apply(&self, message: InboundMessage) {
        debug!(kind = message.kind(), "applying message");
        match message {
            InboundMessage::GameAction(response) => self.apply_game_action(response),
            InboundMessage::Move(movement) => self.apply_move(&movement),
            InboundMessage::Roster(update) => {
                self.replace_roster(update.players());
                if update.started() == Some(true) {
                    self.mark_started();
                }
            }
            InboundMessage::PlayerOrders(orders) => self.apply_player_orders(orders),
            InboundMessage::PlayerList(list) => {
                self.replace_roster(list.player_ids());
            }
            InboundMessage::PlayerUpdate(update) => {
                self.upsert_player(&update.player_name, update.color);
            }
            InboundMessage::Output(output) => self.apply_output(output),
            InboundMessage::Chat(chat) => self.events.emit(LifeGameEvent::ChatReceived(chat)),
            InboundMessage::GameStatus(status) => {
                if status.started {
                    self.mark_started();
                }
            }
            InboundMessage::Jobs(jobs) => self.events.emit(LifeGameEvent::JobOffers(jobs)),
            InboundMessage::Houses(houses) => {
                self.events.emit(LifeGameEvent::HouseOffers(houses));
            }
            InboundMessage::ActionCard(card) => {
                self.events.emit(LifeGameEvent::ActionCardReceived(card));
            }
        }
    }

    /// Replace the roster with `names` in slot order.
    ///
    /// Retained players keep their color and position. Players missing from
    /// `names` are returned with status [`MembershipStatus::Removed`], and
    /// their pending choice, board position and turn slot are released.
    pub fn replace_roster(&self, names: Vec<PlayerId>) -> Vec<Player> {
        let mut removed = Vec::new();
        self.roster.send_if_modified(|roster| {
            let mut next: Vec<Player> = Vec::with_capacity(names.len());
            for name in names {
                if next.iter().any(|p| p.id == name) {
                    continue;
                }
                let player = match roster.iter().find(|p| p.id == name) {
                    Some(existing) => Player {
                        status: MembershipStatus::Active,
                        ..existing.clone()
                    },
                    None => Player::new(name),
                };
                next.push(player);
            }

            removed = roster
                .iter()
                .filter(|old| !next.iter().any(|p| p.id == old.id))
                .map(|old| Player {
                    status: MembershipStatus::Removed,
                    ..old.clone()
                })
                .collect();

            if *roster == next {
                false
            } else {
                *roster = next;
                true
            }
        });

        if !removed.is_empty() {
            let ids: Vec<&str> = removed.iter().map(|p| p.id.as_str()).collect();
            debug!(?ids, "players left the lobby");
            self.release(&ids);
            self.events
                .emit(LifeGameEvent::PlayersRemoved(removed.clone()));
        }
        removed
    }

    /// Insert a player that is not yet known. Known players are left as they are.
    pub fn upsert_player(&self, name: &str, color: Option<CarColor>) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.roster.send_if_modified(|roster| {
            if roster.iter().any(|p| p.id == name) {
                return false;
            }
            roster.push(Player {
                color,
                ..Player::new(name)
            });
            true
        });
    }

    /// Apply a single-player move delta.
    ///
    /// A non-empty `nextPossibleFields` opens a pending choice for the player,
    /// replacing any earlier one; an empty list clears it.
    pub fn apply_move(&self, movement: &MoveMessage) {
        let player = movement.player_id();
        debug!(
            player,
            field = movement.field_index,
            field_type = %movement.field_type(),
            "player moved"
        );
        self.set_position(player, movement.field_index);
        self.set_pending(player, movement.next_possible_fields.clone());
    }

    /// Set the game-started flag. It never goes back to `false`.
    pub fn mark_started(&self) {
        let flipped = self.started.send_if_modified(|started| {
            if *started {
                false
            } else {
                *started = true;
                true
            }
        });
        if flipped {
            debug!("game started");
            self.events.emit(LifeGameEvent::GameStarted);
        }
    }

    /// Replace the snapshot from an authoritative game action response.
    pub fn apply_game_action(&self, response: GameActionResponse) {
        if let Some(state) = response.game_state {
            for name in state.player_positions.keys() {
                self.upsert_player(name, None);
            }
            self.roster.send_if_modified(|roster| {
                let mut changed = false;
                for player in roster.iter_mut() {
                    if let Some(&pos) = state.player_positions.get(&player.id) {
                        if player.field_index != pos {
                            player.field_index = pos;
                            changed = true;
                        }
                    }
                }
                changed
            });

            let status = if state.finished == Some(true) {
                GameStatus::Finished
            } else {
                GameStatus::Running
            };
            let snapshot = GameSnapshot {
                positions: state.player_positions,
                current_player: state
                    .current_player
                    .or_else(|| Some(self.local_player.clone())),
                status,
            };
            self.snapshot.send_replace(snapshot.clone());
            self.events.emit(LifeGameEvent::GameStateUpdated(snapshot));
        }

        if let Some(result) = response.move_result {
            self.set_position(&self.local_player, result.position);
            if result.requires_choice {
                self.set_pending(&self.local_player, result.options);
            }
        }

        if !response.success {
            warn!(message = ?response.message, "server rejected the action");
            self.events.emit(LifeGameEvent::ActionRejected {
                message: response.message,
            });
        }
    }

    /// Replace the turn-order draft.
    ///
    /// Slots outside `1..=4` are dropped. When two players claim the same
    /// slot, the first in player-name order keeps it.
    pub fn apply_player_orders(&self, message: PlayerOrderMessage) {
        let mut draft: BTreeMap<PlayerId, u8> = BTreeMap::new();
        for (player, raw_slot) in message.player_orders {
            let slot = match u8::try_from(raw_slot) {
                Ok(slot) if (1..=MAX_TURN_SLOT).contains(&slot) => slot,
                _ => {
                    warn!(player = %player, slot = raw_slot, "ignoring out-of-range turn slot");
                    continue;
                }
            };
            if let Some((holder, _)) = draft.iter().find(|(_, s)| **s == slot) {
                warn!(player = %player, holder = %holder, slot, "turn slot already claimed");
                continue;
            }
            draft.insert(player, slot);
        }

        let changed = self.orders.send_if_modified(|orders| {
            if *orders == draft {
                false
            } else {
                *orders = draft.clone();
                true
            }
        });
        if changed {
            self.events
                .emit(LifeGameEvent::PlayerOrdersUpdated(draft));
        }
        if message.is_started == Some(true) {
            self.mark_started();
        }
    }

    /// Drop a player's pending choice. Returns whether one was open.
    pub fn clear_pending_choice(&self, player: &str) -> bool {
        self.pending
            .send_if_modified(|pending| pending.remove(player).is_some())
    }

    /// Snapshot shown right after connecting, before the server has sent
    /// anything: the local player alone on the start field.
    pub fn apply_placeholder(&self) {
        let snapshot = GameSnapshot {
            positions: BTreeMap::from([(self.local_player.clone(), 0)]),
            current_player: Some(self.local_player.clone()),
            status: GameStatus::Connected,
        };
        self.snapshot.send_replace(snapshot.clone());
        self.events.emit(LifeGameEvent::GameStateUpdated(snapshot));
    }

    /// Record the local player's car color.
    pub fn set_local_color(&self, color: CarColor) {
        self.upsert_player(&self.local_player, Some(color));
        self.roster.send_if_modified(|roster| {
            match roster.iter_mut().find(|p| p.id == self.local_player) {
                Some(player) if player.color != Some(color) => {
                    player.color = Some(color);
                    true
                }
                _ => false,
            }
        });
    }

    fn apply_output(&self, output: OutputMessage) {
        self.upsert_player(&output.player_name, None);
        if let Some(position) = output.position {
            self.set_position(&output.player_name, position);
            if !output.options.is_empty() {
                self.set_pending(&output.player_name, output.options.clone());
            }
        }
        self.events.emit(LifeGameEvent::LobbyNotice(output));
    }

    fn set_position(&self, player: &str, field: FieldIndex) {
        self.roster.send_if_modified(|roster| {
            match roster.iter_mut().find(|p| p.id == player) {
                Some(existing) if existing.field_index == field => false,
                Some(existing) => {
                    existing.field_index = field;
                    true
                }
                None => {
                    roster.push(Player {
                        field_index: field,
                        ..Player::new(player)
                    });
                    true
                }
            }
        });

        let mut updated = None;
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.positions.get(player) == Some(&field) {
                return false;
            }
            snapshot.positions.insert(player.to_string(), field);
            updated = Some(snapshot.clone());
            true
        });
        if let Some(snapshot) = updated {
            self.events.emit(LifeGameEvent::GameStateUpdated(snapshot));
        }
    }

    fn set_pending(&self, player: &str, options: Vec<FieldIndex>) {
        if options.is_empty() {
            self.clear_pending_choice(player);
            return;
        }
        self.pending.send_modify(|pending| {
            pending.insert(player.to_string(), options.clone());
        });
        self.events.emit(LifeGameEvent::ChoiceRequired {
            player: player.to_string(),
            options,
        });
    }

    fn release(&self, ids: &[&str]) {
        self.pending.send_if_modified(|pending| {
            let before = pending.len();
            pending.retain(|player, _| !ids.contains(&player.as_str()));
            pending.len() != before
        });

        let mut updated = None;
        self.snapshot.send_if_modified(|snapshot| {
            let before = snapshot.positions.len();
            snapshot
                .positions
                .retain(|player, _| !ids.contains(&player.as_str()));
            if snapshot.positions.len() == before {
                return false;
            }
            updated = Some(snapshot.clone());
            true
        });
        if let Some(snapshot) = updated {
            self.events.emit(LifeGameEvent::GameStateUpdated(snapshot));
        }

        let mut draft = None;
        self.orders.send_if_modified(|orders| {
            let before = orders.len();
            orders.retain(|player, _| !ids.contains(&player.as_str()));
            if orders.len() == before {
                return false;
            }
            draft = Some(orders.clone());
            true
        });
        if let Some(draft) = draft {
            self.events.emit(LifeGameEvent::PlayerOrdersUpdated(draft));
        }
    }
}
