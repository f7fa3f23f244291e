//! Client configuration.

use std::time::Duration;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default budget for one connect attempt (transport open plus STOMP handshake).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default pause between two failed endpoints.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Default timeout of one TCP reachability probe.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Port of the game server.
pub const DEFAULT_PORT: u16 = 8080;

/// Path of the STOMP broker endpoint on the game server.
pub const DEFAULT_BROKER_PATH: &str = "/websocket-broker";

/// Hosts tried in order: the Android emulator's host alias first, then loopback.
pub const DEFAULT_HOSTS: [&str; 3] = ["10.0.2.2", "localhost", "127.0.0.1"];

/// Configuration for a [`LifeGameClient`](crate::LifeGameClient).
///
/// Only the player name and game id are required; everything else has a
/// default that matches the stock server deployment.
///
/// ```
/// use lifegame_client::LifeGameConfig;
/// use std::time::Duration;
///
/// let config = LifeGameConfig::new("Alice", "1234")
///     .with_endpoints(vec!["ws://game.local:8080/websocket-broker".into()])
///     .with_connect_timeout(Duration::from_secs(3));
/// assert_eq!(config.endpoints.len(), 1);
/// assert_eq!(config.probe_port, 8080);
/// ```
#[derive(Debug, Clone)]
pub struct LifeGameConfig {
    /// Name of the local player. Doubles as its id.
    pub player_name: String,
    /// Game (or lobby) id sent with every command.
    pub game_id: String,
    /// Candidate WebSocket URIs, tried in order.
    pub endpoints: Vec<String>,
    /// Budget for a single connect attempt. Defaults to **10 seconds**.
    pub connect_timeout: Duration,
    /// Pause after a failed attempt before the next endpoint. Not applied
    /// after the last one. Defaults to **500 ms**.
    pub retry_backoff: Duration,
    /// Port checked by the reachability probe.
    pub probe_port: u16,
    /// Hosts checked by the reachability probe.
    pub probe_hosts: Vec<String>,
    /// Timeout of each probe. Defaults to **2 seconds**.
    pub probe_timeout: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// Events are dropped (with a warning logged) when the consumer falls
    /// behind, except `Disconnected`. Defaults to **256**, clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`disconnect`](crate::LifeGameClient::disconnect) waits for the
    /// session loop before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl LifeGameConfig {
    /// Defaults for `player_name` in game `game_id`: the three standard
    /// endpoints on port 8080, probed on the same hosts.
    pub fn new(player_name: impl Into<String>, game_id: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            game_id: game_id.into(),
            endpoints: Self::endpoints_for(&DEFAULT_HOSTS, DEFAULT_PORT, DEFAULT_BROKER_PATH),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            probe_port: DEFAULT_PORT,
            probe_hosts: DEFAULT_HOSTS.iter().map(|h| (*h).to_string()).collect(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Build `ws://{host}:{port}{broker_path}` for every host, in order.
    pub fn endpoints_for<S: AsRef<str>>(hosts: &[S], port: u16, broker_path: &str) -> Vec<String> {
        let path = if broker_path.starts_with('/') || broker_path.is_empty() {
            broker_path.to_string()
        } else {
            format!("/{broker_path}")
        };
        hosts
            .iter()
            .map(|host| format!("ws://{}:{port}{path}", host.as_ref()))
            .collect()
    }

    /// Candidate endpoints, tried in order.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Timeout for a single connect attempt.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Pause between failed attempts.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_probe_port(mut self, port: u16) -> Self {
        self.probe_port = port;
        self
    }

    /// Hosts checked for TCP reachability when every endpoint fails.
    #[must_use]
    pub fn with_probe_hosts(mut self, hosts: Vec<String>) -> Self {
        self.probe_hosts = hosts;
        self
    }

    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// A zero timeout aborts the session loop without waiting.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LifeGameConfig::new("Alice", "42");
        assert_eq!(
            config.endpoints,
            vec![
                "ws://10.0.2.2:8080/websocket-broker",
                "ws://localhost:8080/websocket-broker",
                "ws://127.0.0.1:8080/websocket-broker",
            ]
        );
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.probe_port, 8080);
        assert_eq!(config.probe_hosts, vec!["10.0.2.2", "localhost", "127.0.0.1"]);
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = LifeGameConfig::new("Alice", "42").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn endpoints_for_normalizes_path() {
        assert_eq!(
            LifeGameConfig::endpoints_for(&["example.org"], 9000, "broker"),
            vec!["ws://example.org:9000/broker"]
        );
        assert_eq!(
            LifeGameConfig::endpoints_for(&["a", "b"], 1, "/x"),
            vec!["ws://a:1/x", "ws://b:1/x"]
        );
    }
}
