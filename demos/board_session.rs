//! # Board Session Example
//!
//! Joins a lobby on a running game server and follows the game:
//!
//! 1. Connect over STOMP/WebSocket, walking the candidate hosts in order
//! 2. Join (or create) a lobby and follow its roster
//! 3. Start on field 0 once the game starts, roll, and pick the first
//!    offered field whenever a choice is required
//! 4. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start the game server on port 8080, then:
//! cargo run --example board_session
//!
//! # Override player, lobby and hosts:
//! LIFEGAME_PLAYER=Lena LIFEGAME_LOBBY=1234 LIFEGAME_HOSTS=192.168.0.5,localhost \
//!     cargo run --example board_session
//! ```

use lifegame_client::config::{DEFAULT_BROKER_PATH, DEFAULT_PORT};
use lifegame_client::{LifeGameClient, LifeGameConfig, LifeGameEvent, WebSocketConnector};

const DEFAULT_PLAYER: &str = "RustPlayer";
const DEFAULT_LOBBY: &str = "1";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=lifegame_client=debug` for frame-level output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let player = std::env::var("LIFEGAME_PLAYER").unwrap_or_else(|_| DEFAULT_PLAYER.to_string());
    let lobby = std::env::var("LIFEGAME_LOBBY").unwrap_or_else(|_| DEFAULT_LOBBY.to_string());

    let mut config = LifeGameConfig::new(&player, &lobby);
    if let Ok(hosts) = std::env::var("LIFEGAME_HOSTS") {
        let hosts: Vec<String> = hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        config = config
            .with_endpoints(LifeGameConfig::endpoints_for(
                &hosts,
                DEFAULT_PORT,
                DEFAULT_BROKER_PATH,
            ))
            .with_probe_hosts(hosts);
    }

    // ── Connect ─────────────────────────────────────────────────────
    let (client, mut event_rx) = LifeGameClient::start(config, WebSocketConnector::new());
    let endpoint = match client.connect().await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            // The error already carries the per-host reachability report.
            tracing::error!("{e}");
            return Err(e.into());
        }
    };
    tracing::info!("Connected to {endpoint} as {player}");

    client.gateway().join_lobby(&lobby);
    client.observe_lobby(&lobby)?;
    client.observe_player_orders()?;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    LifeGameEvent::GameStarted => {
                        tracing::info!("Game started, joining on field 0");
                        client.gateway().join_game(0);
                        client.gateway().move_player(1);
                    }

                    LifeGameEvent::GameStateUpdated(snapshot) => {
                        tracing::info!(
                            "Board: {:?} (turn: {})",
                            snapshot.positions,
                            snapshot.current_player.as_deref().unwrap_or("-")
                        );
                    }

                    LifeGameEvent::ChoiceRequired { player: who, options } if who == player => {
                        if let Some(&field) = options.first() {
                            tracing::info!("Choosing field {field} from {options:?}");
                            client.gateway().choose_field(field);
                        }
                    }

                    LifeGameEvent::PlayersRemoved(players) => {
                        for p in players {
                            tracing::info!("Player left: {}", p.name);
                        }
                    }

                    LifeGameEvent::ChatReceived(msg) => {
                        tracing::info!(
                            "[chat] {}: {}",
                            msg.player_name,
                            msg.content.as_deref().unwrap_or("")
                        );
                    }

                    LifeGameEvent::ActionRejected { message } => {
                        tracing::warn!("Rejected: {}", message.as_deref().unwrap_or("no reason"));
                    }

                    LifeGameEvent::Error { code, message, .. } => {
                        tracing::error!("[{code}] {message}");
                    }

                    LifeGameEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("server closed"));
                        break;
                    }

                    other => {
                        tracing::debug!("Event: {other:?}");
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving lobby");
                client.gateway().leave_lobby();
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.disconnect().await;
    tracing::info!("Client shut down");
    Ok(())
}
