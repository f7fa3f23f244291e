//! Transport and connector seams.
//!
//! A [`Transport`] is one open, bidirectional text channel carrying STOMP
//! frames (one frame per message). A [`Connector`] opens transports for a
//! given endpoint URI; the connection manager calls it once per attempt while
//! walking the candidate endpoint list.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use lifegame_client::error::LifeGameError;
//! use lifegame_client::transport::{Connector, Transport};
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     outbound: mpsc::UnboundedSender<String>,
//!     inbound: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), LifeGameError> {
//!         self.outbound
//!             .send(frame)
//!             .map_err(|e| LifeGameError::TransportSend(e.to_string()))
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, LifeGameError>> {
//!         self.inbound.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), LifeGameError> {
//!         self.inbound.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::LifeGameError;

/// A bidirectional text message transport.
///
/// # Object Safety
///
/// The trait is object-safe; connectors hand out `Box<dyn Transport>`.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`. Cancelling it must not lose a message.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`LifeGameError::TransportSend`] if the frame could not be written.
    async fn send(&mut self, frame: String) -> Result<(), LifeGameError>;

    /// Receive the next text message.
    ///
    /// Returns `None` once the connection is closed cleanly.
    async fn recv(&mut self) -> Option<Result<String, LifeGameError>>;

    /// Close the connection. Resources must be released even if the close
    /// handshake fails.
    async fn close(&mut self) -> Result<(), LifeGameError>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, frame: String) -> Result<(), LifeGameError> {
        (**self).send(frame).await
    }

    async fn recv(&mut self) -> Option<Result<String, LifeGameError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), LifeGameError> {
        (**self).close().await
    }
}

/// Opens a [`Transport`] to an endpoint URI.
///
/// Called once per connect attempt. The connection manager bounds each call
/// with the per-attempt timeout, so implementations need not time out
/// themselves.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// # Errors
    ///
    /// Any error; it is recorded as the attempt's failure and the next
    /// endpoint is tried.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, LifeGameError>;
}
