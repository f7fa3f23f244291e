//! Error types for the game client.

use thiserror::Error;

use crate::codec::DecodeError;
use crate::diagnostics::ReachabilityReport;
use crate::error_codes::ErrorCode;

/// Errors that can occur when using the game client.
#[derive(Debug, Error)]
pub enum LifeGameError {
    /// A single connection attempt did not finish within its timeout.
    #[error("connection attempt to {endpoint} timed out")]
    ConnectionTimeout {
        /// Endpoint that did not answer.
        endpoint: String,
    },

    /// Every candidate endpoint failed.
    #[error("could not connect to any endpoint (last error: {last_error})\n{report}")]
    AllEndpointsExhausted {
        /// Per-host TCP reachability, gathered after the last attempt failed.
        report: ReachabilityReport,
        /// Message of the last attempt's error.
        last_error: String,
    },

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Attempted an operation that requires a live session.
    #[error("not connected to server")]
    NotConnected,

    /// An inbound payload matched no known message shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A command was rejected locally before anything was sent.
    #[error("invalid command state: {0}")]
    InvalidCommandState(String),

    /// The broker sent a STOMP `ERROR` frame.
    #[error("broker error: {message}")]
    Broker {
        /// Value of the frame's `message` header, or its body.
        message: String,
    },

    /// A STOMP frame could not be parsed.
    #[error("malformed STOMP frame: {0}")]
    Frame(String),

    /// Failed to serialize an outbound message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifeGameError {
    /// The coarse [`ErrorCode`] a UI collaborator should react to.
    pub fn code(&self) -> ErrorCode {
        match self {
            LifeGameError::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            LifeGameError::AllEndpointsExhausted { .. } => ErrorCode::AllEndpointsExhausted,
            LifeGameError::Decode(_) => ErrorCode::DecodeError,
            LifeGameError::InvalidCommandState(_) => ErrorCode::InvalidCommandState,
            LifeGameError::Broker { .. } | LifeGameError::Frame(_) => ErrorCode::BrokerError,
            LifeGameError::TransportSend(_)
            | LifeGameError::TransportReceive(_)
            | LifeGameError::TransportClosed
            | LifeGameError::NotConnected
            | LifeGameError::Serialization(_)
            | LifeGameError::Io(_) => ErrorCode::TransportSendFailure,
        }
    }

    /// Reachability diagnostics, present only for exhausted connects.
    pub fn reachability(&self) -> Option<&ReachabilityReport> {
        match self {
            LifeGameError::AllEndpointsExhausted { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for game client operations.
pub type Result<T> = std::result::Result<T, LifeGameError>;
