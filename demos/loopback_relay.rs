//! # Loopback Relay Example
//!
//! Drives a [`ScoreboardClient`] against an in-process fake relay built on
//! a custom [`Connector`]/[`Transport`] pair. Useful for seeing the protocol
//! without running a server:
//!
//! 1. The client connects and sends its handshake
//! 2. The fake relay makes it master and issues a token
//! 3. A few operations are applied and each snapshot reaches the relay
//! 4. A remote update arrives and is applied without being echoed
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback_relay
//! ```

use std::sync::Mutex;

use async_trait::async_trait;
use scoreboard_sync::{
    ClientType, Connector, CredentialStore, MemoryCredentialStore, Operation, ScoreboardClient,
    ScoreboardConfig, ScoreboardError, ScoreboardEvent, Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// A connector that hands out one loopback connection
// ─────────────────────────────────────────────────────────────────────

struct LoopbackTransport {
    to_relay: mpsc::UnboundedSender<String>,
    from_relay: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), ScoreboardError> {
        self.to_relay
            .send(message)
            .map_err(|e| ScoreboardError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ScoreboardError>> {
        self.from_relay.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ScoreboardError> {
        Ok(())
    }
}

struct LoopbackConnector {
    transport: Mutex<Option<LoopbackTransport>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ScoreboardError> {
        tracing::info!("loopback connect to {url}");
        let transport = self
            .transport
            .lock()
            .map_err(|_| ScoreboardError::Connect("connector poisoned".into()))?
            .take()
            .ok_or_else(|| ScoreboardError::Connect("loopback already used".into()))?;
        Ok(Box::new(transport))
    }
}

/// Relay side of the loopback.
struct FakeRelay {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl FakeRelay {
    async fn expect(&mut self) -> Result<Value, Box<dyn std::error::Error>> {
        let text = self
            .from_client
            .recv()
            .await
            .ok_or("client hung up")?;
        Ok(serde_json::from_str(&text)?)
    }

    fn send(&self, value: Value) -> Result<(), Box<dyn std::error::Error>> {
        self.to_client.send(value.to_string())?;
        Ok(())
    }
}

fn loopback() -> (LoopbackConnector, FakeRelay) {
    let (to_relay, from_client) = mpsc::unbounded_channel();
    let (to_client, from_relay) = mpsc::unbounded_channel();
    (
        LoopbackConnector {
            transport: Mutex::new(Some(LoopbackTransport {
                to_relay,
                from_relay,
            })),
        },
        FakeRelay {
            from_client,
            to_client,
        },
    )
}

// ─────────────────────────────────────────────────────────────────────
// Wire it together
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (connector, mut relay) = loopback();
    let store = MemoryCredentialStore::new();
    let config = ScoreboardConfig::new(ClientType::Operation);
    let (mut client, mut events) = ScoreboardClient::start(connector, store.clone(), config);

    // ── Handshake and role ──────────────────────────────────────────
    let handshake = relay.expect().await?;
    tracing::info!("relay received: {handshake}");
    relay.send(json!({
        "type": "role_assignment",
        "role": "master",
        "clientId": 1,
        "masterClientId": 1,
        "masterToken": "demo-token"
    }))?;

    // ── Operate once mastership is granted ──────────────────────────
    while let Some(event) = events.recv().await {
        match event {
            ScoreboardEvent::RoleAssigned { role, .. } => {
                tracing::info!("role: {role}, token stored: {:?}", store.get());
                client.apply(Operation::AdvanceHalfInning)?;
                client.apply(Operation::BallUp)?;
                client.apply(Operation::ScoreTopUp)?;

                // Each local change reaches the relay as a full snapshot.
                for n in 1..=3 {
                    let snapshot = relay.expect().await?;
                    tracing::info!("relay received snapshot #{n}: {}", snapshot["boardData"]);
                }
                relay.send(json!({ "type": "game_state", "boardData": { "team_top": "Hawks" } }))?;
            }
            ScoreboardEvent::StateChanged { state, origin } => {
                tracing::info!(
                    "{origin:?} change: {} | B{} S{} O{} | {}-{}",
                    state.phase(),
                    state.balls,
                    state.strikes,
                    state.outs,
                    state.score_top,
                    state.score_bottom
                );
                if state.team_top == "Hawks" {
                    break;
                }
            }
            ScoreboardEvent::Disconnected { reason } => {
                tracing::info!("disconnected: {}", reason.as_deref().unwrap_or("clean"));
                break;
            }
            other => tracing::info!("event: {other:?}"),
        }
    }

    client.shutdown().await;
    tracing::info!("done");
    Ok(())
}
