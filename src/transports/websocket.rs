//! WebSocket link to the relay, built on `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] is what [`ScoreboardClient::connect_websocket`]
//! uses to open a fresh [`WebSocketTransport`] for every connect and
//! reconnect attempt. Both `ws://` and `wss://` URLs work; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! [`ScoreboardClient::connect_websocket`]: crate::ScoreboardClient::connect_websocket
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), scoreboard_sync::ScoreboardError> {
//! use scoreboard_sync::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://127.0.0.1:8080/ws").await?;
//! transport
//!     .send(r#"{"type":"handshake","clientType":"board"}"#.to_string())
//!     .await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("relay said: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::ScoreboardError;
use crate::transport::{Connector, Transport};

/// The underlying stream type, public for [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// Only text frames carry relay envelopes. Binary frames are skipped, and
/// pings are answered by tungstenite itself.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe, so the session can race it
/// against commands in `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a connection to `url`.
    ///
    /// # Errors
    ///
    /// [`ScoreboardError::Connect`] if the URL is invalid or the relay cannot
    /// be reached or refuses the upgrade.
    pub async fn connect(url: &str) -> Result<Self, ScoreboardError> {
        debug!(url = %url, "opening WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ScoreboardError::Connect(format!("{url}: {e}")))?;

        info!(url = %url, "WebSocket open");
        Ok(Self::from_stream(stream))
    }

    /// Like [`connect`](Self::connect), failing with
    /// [`ScoreboardError::Timeout`] once `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`ScoreboardError::Timeout`], or anything `connect` returns.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, ScoreboardError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ScoreboardError::Timeout)?
    }

    /// Wrap a stream opened elsewhere (custom TLS, headers, ...).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ScoreboardError> {
        if self.closed {
            return Err(ScoreboardError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| ScoreboardError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ScoreboardError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(ScoreboardError::TransportReceive(e.to_string()))),
            };

            match frame {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(close) => {
                    debug!(?close, "relay sent close frame");
                    return None;
                }
                Message::Binary(_) => warn!("skipping binary frame from relay"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), ScoreboardError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ScoreboardError::TransportSend(e.to_string()))
    }
}

/// Opens a new [`WebSocketTransport`] per attempt.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abandon an attempt that has not opened within `timeout`. The failure
    /// feeds the normal reconnect backoff.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ScoreboardError> {
        let transport = match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(url, timeout).await?,
            None => WebSocketTransport::connect(url).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one WebSocket on an ephemeral port, run `relay` on it, and
    /// return the URL to dial.
    async fn spawn_relay<F, Fut>(relay: F) -> String
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
            relay(ws).await;
        });

        format!("ws://{addr}/ws")
    }

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_traits<T: Send + std::fmt::Debug>() {}
        assert_traits::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn invalid_url_is_connect_error() {
        let err = WebSocketTransport::connect("not a url").await.unwrap_err();
        assert!(matches!(err, ScoreboardError::Connect(_)));
    }

    #[tokio::test]
    async fn unreachable_relay_is_connect_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/ws")
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreboardError::Connect(_)));
    }

    #[tokio::test]
    async fn connect_timeout_elapses() {
        // Accepts the TCP connection but never answers the upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            let _ = hold_rx.await;
        });

        let err = WebSocketTransport::connect_with_timeout(
            &format!("ws://{addr}/ws"),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScoreboardError::Timeout));
        drop(hold_tx);
    }

    #[tokio::test]
    async fn text_frames_arrive_and_binary_is_skipped() {
        let url = spawn_relay(|mut ws| async move {
            ws.send(Message::Binary(vec![0xBE, 0xEF].into())).await.unwrap();
            ws.send(Message::Text(r#"{"ball_cnt":1}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"ball_cnt":1}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn relay_sees_what_we_send() {
        let url = spawn_relay(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"type":"release_master"}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"release_master"}"#
        );
    }

    #[tokio::test]
    async fn send_after_close_is_transport_closed() {
        let url = spawn_relay(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, ScoreboardError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_opens_boxed_transport() {
        let url = spawn_relay(|mut ws| async move {
            ws.send(Message::Text("hello".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_secs(5));
        let mut transport = connector.connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
    }

    #[tokio::test]
    async fn connector_failure_is_error_not_panic() {
        let connector = WebSocketConnector::new();
        assert!(connector.connect("ws://127.0.0.1:1/ws").await.is_err());
    }
}
