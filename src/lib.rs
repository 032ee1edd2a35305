//! # Scoreboard Sync
//!
//! Real-time baseball scoreboard client. Several clients share one live
//! [`GameState`] through a relay: exactly one operator client is master and
//! may mutate it, other operators are read-only slaves, and board clients
//! only display.
//!
//! ## Features
//!
//! - **Game rules**: [`GameStateModel`] applies [`Operation`]s with count
//!   limits, half-inning progression and extra-inning handling
//! - **Role negotiation**: the relay assigns master/slave; a master token is
//!   kept in a [`CredentialStore`] and presented on every reconnect
//! - **Loop-safe sync**: only the master broadcasts, and remote snapshots are
//!   never echoed back
//! - **Reconnection**: exponential backoff (1s doubling, 30s cap, 10 attempts)
//! - **Transport-agnostic**: implement [`Connector`] and [`Transport`] for any
//!   backend; WebSocket is built in behind `transport-websocket`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scoreboard_sync::{
//!     ClientType, Operation, PageContext, ScoreboardClient, ScoreboardConfig, ScoreboardEvent,
//! };
//!
//! # async fn run() -> Result<(), scoreboard_sync::ScoreboardError> {
//! let config = ScoreboardConfig::new(ClientType::Operation)
//!     .with_page(PageContext::embedded());
//! let (mut client, mut events) = ScoreboardClient::connect_websocket(config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ScoreboardEvent::RoleAssigned { role, .. } if !role.operations_disabled() => {
//!             client.apply(Operation::StrikeUp)?;
//!         }
//!         ScoreboardEvent::StateChanged { state, .. } => println!("{}", state.phase()),
//!         ScoreboardEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod event;
pub mod game;
pub mod protocol;
pub mod role;
pub mod sync;
pub mod transport;
pub mod transports;

pub use client::ScoreboardClient;
pub use config::{InitData, PageContext, ReconnectPolicy, ScoreboardConfig};
pub use connection::ConnectionStatus;
pub use credentials::{CredentialStore, MemoryCredentialStore};
pub use error::ScoreboardError;
pub use event::{ScoreboardEvent, StateOrigin};
pub use game::{Base, GamePhase, GameState, GameStateModel, Half, Operation};
pub use protocol::{ClientId, ClientMessage, ClientType, Role, ServerMessage, StatePatch};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
