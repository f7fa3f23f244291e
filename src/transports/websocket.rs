//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each STOMP frame travels as one WebSocket text message. Both `ws://` and
//! `wss://` URIs work; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), lifegame_client::LifeGameError> {
//! use lifegame_client::{LifeGameClient, LifeGameConfig, WebSocketConnector};
//!
//! let config = LifeGameConfig::new("Alice", "1234");
//! let (client, mut events) = LifeGameClient::start(config, WebSocketConnector::new());
//! let endpoint = client.connect().await?;
//! println!("connected to {endpoint}");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::LifeGameError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by one WebSocket connection.
///
/// [`recv`](Transport::recv) is cancel-safe: the stream only yields a message
/// once it is complete, so dropping the future loses nothing.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`LifeGameError::Io`], keeping the I/O error kind when the
    /// handshake failed at the socket level.
    pub async fn connect(url: &str) -> Result<Self, LifeGameError> {
        debug!(endpoint = %url, "opening WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            LifeGameError::Io(std::io::Error::new(kind, e))
        })?;

        info!(endpoint = %url, "WebSocket open");
        Ok(Self::from_stream(stream))
    }

    /// Wrap a stream that was set up elsewhere (custom TLS, headers, proxies).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), LifeGameError> {
        if self.closed {
            return Err(LifeGameError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| LifeGameError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, LifeGameError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(LifeGameError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    // Some brokers send STOMP frames as binary messages.
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!("dropping non-UTF-8 binary WebSocket message"),
                },
                Message::Close(frame) => {
                    debug!(?frame, "WebSocket closed by peer");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), LifeGameError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| LifeGameError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] that opens a [`WebSocketTransport`] per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, LifeGameError> {
        let transport = WebSocketTransport::connect(endpoint).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a local port and hand it to `handler`.
    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/websocket-broker")
    }

    #[tokio::test]
    async fn refused_connection_is_io_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = WebSocketTransport::connect(&format!("ws://127.0.0.1:{port}/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifeGameError::Io(_)));
    }

    #[tokio::test]
    async fn invalid_url_is_io_error() {
        let err = WebSocketConnector::new()
            .connect("not a url")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LifeGameError::Io(_)));
    }

    #[tokio::test]
    async fn connector_exchanges_stomp_frames() {
        let url = serve_once(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                assert!(text.starts_with("CONNECT\n"));
                ws.send(Message::Text("CONNECTED\nversion:1.2\n\n\0".into()))
                    .await
                    .unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new().connect(&url).await.unwrap();
        transport
            .send(crate::stomp::Frame::connect("127.0.0.1").encode())
            .await
            .unwrap();

        let reply = transport.recv().await.unwrap().unwrap();
        assert!(reply.starts_with("CONNECTED"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn utf8_binary_messages_are_delivered_as_text() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![0xFF, 0xFE].into()))
                .await
                .unwrap();
            ws.send(Message::Binary(b"MESSAGE\n\n{}\0".to_vec().into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "MESSAGE\n\n{}\0");
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let url = serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("SEND\n\n\0".into()).await.unwrap_err();
        assert!(matches!(err, LifeGameError::TransportClosed));
    }
}
