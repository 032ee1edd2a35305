//! Transport abstraction for the scoreboard relay channel.
//!
//! The [`Transport`] trait is a bidirectional text message channel between a
//! client and the relay. Every envelope is one JSON text message, so each
//! implementation handles framing internally (WebSocket frames, in-process
//! channels, ...).
//!
//! A transport represents exactly one live connection. Reconnection does not
//! reuse it: the [`Connector`] builds a brand new transport for every attempt
//! and the previous one is dropped.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use scoreboard_sync::error::ScoreboardError;
//! use scoreboard_sync::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ScoreboardError> {
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ScoreboardError>> {
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ScoreboardError> {
//!         unimplemented!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ScoreboardError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ScoreboardError;

/// A bidirectional text message transport to the relay.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the session loop
/// polls it inside `tokio::select!`. Channel-backed implementations are
/// naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text message to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), ScoreboardError>;

    /// Receive the next JSON text message from the relay.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the relay closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, ScoreboardError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), ScoreboardError>;
}

/// Factory for fresh [`Transport`] connections.
///
/// The connection manager calls [`connect`](Connector::connect) once for the
/// initial attempt and once per reconnect timer expiry. A failure here is
/// handled exactly like an unexpected close.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::Connect`] (or an I/O error) when the
    /// connection cannot be constructed.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ScoreboardError>;
}
