//! Error codes for structured error reporting to UI collaborators.
//!
//! Every [`LifeGameError`](crate::LifeGameError) maps onto one of these codes
//! via [`LifeGameError::code`](crate::LifeGameError::code). The codes are what
//! a UI uses to pick a toast or dialog; the accompanying message carries the
//! details. They serialize as `SCREAMING_SNAKE_CASE` strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse error classes surfaced in [`LifeGameEvent::Error`](crate::LifeGameEvent::Error).
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A single connection attempt did not complete within its budget.
    ConnectionTimeout,
    /// Every candidate endpoint failed; carries reachability diagnostics.
    AllEndpointsExhausted,
    /// A send was attempted without, or after losing, a live session.
    TransportSendFailure,
    /// A payload did not match any known message shape.
    DecodeError,
    /// A command was issued in a state where it cannot be honoured.
    InvalidCommandState,
    /// The broker answered with a STOMP `ERROR` frame.
    BrokerError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ConnectionTimeout => {
                "The game server did not respond in time. Check that the server is running."
            }
            ErrorCode::AllEndpointsExhausted => {
                "Could not connect to the game server on any known address. \
                 See the reachability report for details."
            }
            ErrorCode::TransportSendFailure => {
                "The message could not be sent because there is no active connection."
            }
            ErrorCode::DecodeError => {
                "A message from the server could not be understood and was ignored."
            }
            ErrorCode::InvalidCommandState => {
                "This action is not possible right now (for example, starting a game \
                 before joining a lobby)."
            }
            ErrorCode::BrokerError => "The message broker reported an error.",
        }
    }

    /// Whether the UI should offer a reconnect after this error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConnectionTimeout
                | ErrorCode::AllEndpointsExhausted
                | ErrorCode::TransportSendFailure
                | ErrorCode::BrokerError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ErrorCode::AllEndpointsExhausted => "ALL_ENDPOINTS_EXHAUSTED",
            ErrorCode::TransportSendFailure => "TRANSPORT_SEND_FAILURE",
            ErrorCode::DecodeError => "DECODE_ERROR",
            ErrorCode::InvalidCommandState => "INVALID_COMMAND_STATE",
            ErrorCode::BrokerError => "BROKER_ERROR",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_name() {
        for code in [
            ErrorCode::ConnectionTimeout,
            ErrorCode::AllEndpointsExhausted,
            ErrorCode::TransportSendFailure,
            ErrorCode::DecodeError,
            ErrorCode::InvalidCommandState,
            ErrorCode::BrokerError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
            assert!(!code.description().is_empty());
        }
    }

    #[test]
    fn decode_errors_do_not_suggest_reconnect() {
        assert!(!ErrorCode::DecodeError.is_connection_error());
        assert!(!ErrorCode::InvalidCommandState.is_connection_error());
        assert!(ErrorCode::AllEndpointsExhausted.is_connection_error());
    }
}
