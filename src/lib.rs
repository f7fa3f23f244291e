//! # lifegame-client
//!
//! Client-side connection and session-synchronization core for the
//! *Spiel des Lebens* multiplayer board game.
//!
//! The crate speaks STOMP over WebSocket to the game server, walks a list of
//! candidate endpoints until one answers, routes server topics into a local
//! session state, and sends the player's commands back.
//!
//! ## Features
//!
//! - **Multi-endpoint connect** with per-attempt timeouts and a TCP
//!   reachability report when every endpoint fails
//! - **Tolerant decoding** of the server's loosely typed JSON messages
//! - **Reactive state** exposed as `tokio::sync::watch` receivers
//! - **Event-driven**: [`LifeGameEvent`]s arrive on a bounded channel
//! - **Pluggable transport** through the [`Transport`] and [`Connector`] traits;
//!   the default `transport-websocket` feature provides [`WebSocketConnector`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), lifegame_client::LifeGameError> {
//! use lifegame_client::{LifeGameClient, LifeGameConfig, LifeGameEvent, WebSocketConnector};
//!
//! let config = LifeGameConfig::new("Alice", "1234");
//! let (client, mut events) = LifeGameClient::start(config, WebSocketConnector::new());
//!
//! client.connect().await?;
//! client.gateway().join_lobby("1234");
//! client.observe_lobby("1234")?;
//!
//! while let Some(event) = events.recv().await {
//!     if let LifeGameEvent::GameStarted = event {
//!         client.gateway().join_game(0);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod gateway;
pub mod protocol;
pub mod router;
pub mod session;
pub mod stomp;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::LifeGameClient;
pub use codec::{DecodeError, InboundMessage};
pub use config::LifeGameConfig;
pub use connection::{ConnectionManager, ConnectionState, Subscription};
pub use diagnostics::{HostReachability, ReachabilityReport};
pub use error::LifeGameError;
pub use error_codes::ErrorCode;
pub use event::{EventSink, LifeGameEvent};
pub use gateway::CommandGateway;
pub use router::{Topic, TopicRouter};
pub use session::{GameSnapshot, MembershipStatus, Player, SessionState};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
