#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for scoreboard client integration tests.
//!
//! Provides a scripted [`MockConnector`] that plays the relay: each accepted
//! attempt yields a channel-backed [`MockTransport`] and hands the test a
//! [`RelayLink`] for the other end. Helper functions build the relay's JSON
//! envelopes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use scoreboard_sync::protocol::{ClientId, RoleAssignment, RoleChanged, ServerMessage};
use scoreboard_sync::{Connector, Role, ScoreboardError, Transport};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ── MockTransport ───────────────────────────────────────────────────

/// Client end of one scripted relay connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ScoreboardError> {
        self.outgoing
            .send(message)
            .map_err(|_| ScoreboardError::TransportSend("relay link dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, ScoreboardError>> {
        // `None` once the test drops its `RelayLink`.
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ScoreboardError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── RelayLink ───────────────────────────────────────────────────────

/// Relay end of one connection. Dropping it closes the connection.
pub struct RelayLink {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl RelayLink {
    /// Deliver one text frame to the client.
    pub fn push(&self, text: impl Into<String>) {
        self.to_client.send(text.into()).expect("client transport dropped");
    }

    /// Wait for the next envelope the client sends.
    pub async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(60), self.from_client.recv())
            .await
            .expect("timed out waiting for client message")
            .expect("client transport dropped");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// An envelope the client has already sent, if any.
    pub fn try_sent(&mut self) -> Option<Value> {
        self.from_client
            .try_recv()
            .ok()
            .map(|text| serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Whether the client called `close()` on its end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

fn link_pair() -> (MockTransport, RelayLink) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            incoming,
            outgoing,
            closed: Arc::clone(&closed),
        },
        RelayLink {
            to_client,
            from_client,
            closed,
        },
    )
}

// ── MockConnector ───────────────────────────────────────────────────

/// Outcome of one scripted connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Accept,
    Refuse,
}

/// Times at which the client tried to connect.
pub type ConnectLog = Arc<StdMutex<Vec<Instant>>>;

/// Plays back a script of attempts. Attempts past the end are refused.
pub struct MockConnector {
    script: StdMutex<VecDeque<Option<MockTransport>>>,
    calls: ConnectLog,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, ScoreboardError> {
        self.calls.lock().unwrap().push(Instant::now());
        match self.script.lock().unwrap().pop_front().flatten() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(ScoreboardError::Connect("connection refused".into())),
        }
    }
}

/// Build a connector for `script`, one [`RelayLink`] per accepted attempt
/// in order, and the log of attempt times.
pub fn mock_relay(script: &[Attempt]) -> (MockConnector, VecDeque<RelayLink>, ConnectLog) {
    let mut links = VecDeque::new();
    let transports = script
        .iter()
        .map(|attempt| match attempt {
            Attempt::Accept => {
                let (transport, link) = link_pair();
                links.push_back(link);
                Some(transport)
            }
            Attempt::Refuse => None,
        })
        .collect();
    let calls: ConnectLog = Arc::new(StdMutex::new(Vec::new()));
    let connector = MockConnector {
        script: StdMutex::new(transports),
        calls: Arc::clone(&calls),
    };
    (connector, links, calls)
}

// ── JSON helper functions ───────────────────────────────────────────

/// A `role_assignment` envelope.
pub fn role_assignment_json(role: Role, client_id: u64, master_token: Option<&str>) -> String {
    let master_client_id = (role == Role::Master).then_some(ClientId::Number(client_id));
    serde_json::to_string(&ServerMessage::RoleAssignment(RoleAssignment {
        role,
        client_id: ClientId::Number(client_id),
        master_client_id,
        master_token: master_token.map(Into::into),
    }))
    .expect("role_assignment_json serialization")
}

/// A `role_changed` envelope.
pub fn role_changed_json(
    new_role: Role,
    reason: &str,
    master_token: Option<&str>,
    clear_token: bool,
) -> String {
    serde_json::to_string(&ServerMessage::RoleChanged(RoleChanged {
        new_role,
        reason: Some(reason.into()),
        client_id: None,
        master_client_id: None,
        master_token: master_token.map(Into::into),
        clear_token: clear_token.then_some(true),
    }))
    .expect("role_changed_json serialization")
}

/// A typed `game_state` envelope carrying `board_data`.
pub fn game_state_json(board_data: Value) -> String {
    serde_json::json!({ "type": "game_state", "boardData": board_data }).to_string()
}
