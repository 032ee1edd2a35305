//! Async scoreboard client.
//!
//! [`ScoreboardClient`] is a thin handle that talks to a background session
//! task over an unbounded MPSC channel. The session task is the only place
//! the live [`GameState`] is mutated: it multiplexes operator commands,
//! relay frames, the reconnect timer and the shutdown signal with
//! `tokio::select!`, so everything runs on one logical thread.
//!
//! Events are emitted on a bounded channel returned from
//! [`ScoreboardClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ScoreboardConfig::new(ClientType::Operation)
//!     .with_page(PageContext::hosted("scores.local:8080", false));
//! let (client, mut events) = ScoreboardClient::connect_websocket(config);
//!
//! client.apply(Operation::BallUp)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ScoreboardEvent::StateChanged { state, .. } => println!("{}", state.phase()),
//!         ScoreboardEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::config::ScoreboardConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionStatus};
use crate::credentials::CredentialStore;
use crate::error::{Result, ScoreboardError};
use crate::event::{ScoreboardEvent, StateOrigin};
use crate::game::{GameState, GameStateModel, Operation};
use crate::protocol::{ClientId, ClientMessage, Role, ServerMessage};
use crate::role::RoleCoordinator;
use crate::sync::{apply_remote_state, SyncBroadcaster, SyncedModel};
use crate::transport::Connector;

/// Requests from the handle to the session task.
#[derive(Debug)]
enum Command {
    Apply(Operation),
    ReleaseMaster,
    Restart,
}

// ── Shared state ────────────────────────────────────────────────────

/// Read-only mirror of the session, updated by the session task.
struct ClientState {
    running: AtomicBool,
    status: Mutex<ConnectionStatus>,
    role: Mutex<Role>,
    client_id: Mutex<Option<ClientId>>,
    game: Mutex<GameState>,
}

impl ClientState {
    fn new(game: GameState) -> Self {
        Self {
            running: AtomicBool::new(true),
            status: Mutex::new(ConnectionStatus::Connecting),
            role: Mutex::new(Role::Unassigned),
            client_id: Mutex::new(None),
            game: Mutex::new(game),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running scoreboard session.
///
/// Command methods queue work for the session and return immediately. They
/// only fail with [`ScoreboardError::NotConnected`] once the session has
/// ended; a refused operation is reported as
/// [`ScoreboardEvent::OperationRefused`], not as an error.
pub struct ScoreboardClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<ClientState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ScoreboardClient {
    /// Spawn the session task and return a handle plus event receiver.
    ///
    /// The session connects through `connector` straight away, sends the
    /// handshake on every open, and keeps the reclaim token in `store`.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        connector: impl Connector,
        store: impl CredentialStore,
        config: ScoreboardConfig,
    ) -> (Self, mpsc::Receiver<ScoreboardEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ScoreboardEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ClientState::new(config.initial_state.clone()));

        let session = Session {
            conn: ConnectionManager::new(connector, config.relay_url(), config.reconnect),
            roles: RoleCoordinator::new(config.client_type, store),
            model: GameStateModel::with_observer(config.initial_state, SyncBroadcaster::new()),
            event_tx,
            shared: Arc::clone(&state),
        };
        let task = tokio::spawn(session.run(cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    /// Start over WebSocket with an in-memory credential store.
    #[cfg(feature = "transport-websocket")]
    #[must_use = "the event receiver must be used to receive events"]
    pub fn connect_websocket(
        config: ScoreboardConfig,
    ) -> (Self, mpsc::Receiver<ScoreboardEvent>) {
        Self::start(
            crate::transports::WebSocketConnector::default(),
            crate::credentials::MemoryCredentialStore::new(),
            config,
        )
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Request a scoreboard mutation.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::NotConnected`] if the session has ended.
    pub fn apply(&self, operation: Operation) -> Result<()> {
        self.send(Command::Apply(operation))
    }

    /// Give up mastership. Ignored unless this client is master.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::NotConnected`] if the session has ended.
    pub fn release_master(&self) -> Result<()> {
        self.send(Command::ReleaseMaster)
    }

    /// Reconnect after [`ScoreboardEvent::ConnectionLost`]. Ignored while the
    /// connection is still live or retrying.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::NotConnected`] if the session has ended.
    pub fn restart(&self) -> Result<()> {
        self.send(Command::Restart)
    }

    /// Stop the session: cancel reconnection, close the connection and wait
    /// for the task, aborting it after the configured timeout.
    pub async fn shutdown(&mut self) {
        debug!("ScoreboardClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session task aborted: {join_err}");
                    }
                }
            }
        }

        self.state.running.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Whether the session task is still accepting commands.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.state.status.lock().await
    }

    pub async fn role(&self) -> Role {
        *self.state.role.lock().await
    }

    /// `true` while the relay has this client in a read-only role.
    pub async fn operations_disabled(&self) -> bool {
        self.role().await.operations_disabled()
    }

    pub async fn client_id(&self) -> Option<ClientId> {
        self.state.client_id.lock().await.clone()
    }

    /// Snapshot of the live scoreboard.
    pub async fn game_state(&self) -> GameState {
        self.state.game.lock().await.clone()
    }

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.state.running.load(Ordering::Acquire) {
            return Err(ScoreboardError::NotConnected);
        }
        self.cmd_tx
            .send(cmd)
            .map_err(|_| ScoreboardError::NotConnected)
    }
}

impl std::fmt::Debug for ScoreboardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreboardClient")
            .field("running", &self.is_running())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ScoreboardClient {
    fn drop(&mut self) {
        // No executor is available to drive a graceful close here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Everything the background task owns.
struct Session<S> {
    conn: ConnectionManager,
    roles: RoleCoordinator<S>,
    model: SyncedModel,
    event_tx: mpsc::Sender<ScoreboardEvent>,
    shared: Arc<ClientState>,
}

impl<S: CredentialStore> Session<S> {
    /// Exits on the shutdown signal or when the handle is dropped.
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        debug!("session loop started");
        self.open(false).await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    self.close("client shut down").await;
                    break;
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("command channel closed, shutting down session");
                            self.close("client shut down").await;
                            break;
                        }
                    }
                }

                event = self.conn.next_event() => {
                    self.handle_connection_event(event).await;
                }
            }
        }

        debug!("session loop exited");
    }

    // ── Connection lifecycle ──

    async fn open(&mut self, restart: bool) {
        *self.shared.status.lock().await = ConnectionStatus::Connecting;
        let opened = if restart {
            self.conn.restart().await
        } else {
            self.conn.connect().await
        };
        if opened {
            self.on_open().await;
        } else {
            self.report_link_down().await;
        }
    }

    async fn on_open(&mut self) {
        self.model.observer_mut().set_link_open(true);
        self.publish_status().await;
        self.emit(ScoreboardEvent::Connected);
        let handshake = self.roles.handshake();
        debug!("sending handshake");
        self.send(handshake).await;
    }

    /// Mirror a lost link and report what happens next.
    async fn report_link_down(&mut self) {
        self.model.observer_mut().set_link_open(false);
        self.publish_status().await;
        match self.conn.pending_delay() {
            Some(delay) => self.emit(ScoreboardEvent::Reconnecting {
                attempt: self.conn.attempts() + 1,
                delay,
            }),
            None => self.emit(ScoreboardEvent::ConnectionLost),
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message(text) => self.handle_inbound(&text).await,
            ConnectionEvent::Closed { reason } => {
                match &reason {
                    Some(reason) => warn!("relay connection lost: {reason}"),
                    None => info!("relay closed the connection"),
                }
                self.conn.on_close();
                self.report_link_down().await;
            }
            ConnectionEvent::ReconnectDue => {
                info!(attempt = self.conn.attempts(), "reconnecting to relay");
                self.open(false).await;
            }
        }
    }

    async fn close(&mut self, reason: &str) {
        self.conn.shutdown().await;
        self.model.observer_mut().set_link_open(false);
        self.publish_status().await;
        self.shared.running.store(false, Ordering::Release);
        self.emit_disconnected(Some(reason.to_owned())).await;
    }

    // ── Inbound ──

    async fn handle_inbound(&mut self, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("failed to parse relay message: {e}; raw: {text}");
                return;
            }
        };

        match message {
            ServerMessage::RoleAssignment(assignment) => {
                self.roles.on_role_assignment(assignment);
                self.publish_role().await;
                if let Some(client_id) = self.roles.client_id().cloned() {
                    self.emit(ScoreboardEvent::RoleAssigned {
                        role: self.roles.role(),
                        client_id,
                        master_client_id: self.roles.master_client_id().cloned(),
                    });
                }
            }
            ServerMessage::RoleChanged(change) => {
                let reason = change.reason.clone();
                self.roles.on_role_changed(change);
                self.publish_role().await;
                self.emit(ScoreboardEvent::RoleChanged {
                    role: self.roles.role(),
                    reason,
                });
            }
            ServerMessage::GameState(patch) => {
                if apply_remote_state(&mut self.model, &patch) {
                    self.publish_game().await;
                    self.emit(ScoreboardEvent::StateChanged {
                        state: self.model.state().clone(),
                        origin: StateOrigin::Remote,
                    });
                } else {
                    debug!("remote state already matches local state");
                }
            }
        }
    }

    // ── Commands ──

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Apply(operation) => {
                if self.roles.operations_disabled() {
                    debug!(role = %self.roles.role(), ?operation, "operation refused");
                    self.emit(ScoreboardEvent::OperationRefused { operation });
                    return;
                }
                if self.model.apply(&operation) {
                    self.publish_game().await;
                    self.emit(ScoreboardEvent::StateChanged {
                        state: self.model.state().clone(),
                        origin: StateOrigin::Local,
                    });
                    self.flush_outbound().await;
                }
            }
            Command::ReleaseMaster => {
                let was_open = self.conn.is_open();
                if let Err(e) = self.roles.release_master(&mut self.conn).await {
                    warn!("failed to send release request: {e}");
                    if was_open && !self.conn.is_open() {
                        self.report_link_down().await;
                    }
                }
            }
            Command::Restart => {
                if self.conn.status() == ConnectionStatus::Disconnected {
                    info!("restarting relay connection");
                    self.open(true).await;
                } else {
                    debug!(status = ?self.conn.status(), "restart ignored");
                }
            }
        }
    }

    // ── Outbound ──

    async fn flush_outbound(&mut self) {
        while let Some(message) = self.model.observer_mut().take_outbound() {
            self.send(message).await;
        }
    }

    async fn send(&mut self, message: ClientMessage) {
        let was_open = self.conn.is_open();
        if let Err(e) = self.conn.send(&message).await {
            if was_open && !self.conn.is_open() {
                self.report_link_down().await;
            } else {
                debug!("dropping outbound message: {e}");
            }
        }
    }

    // ── Mirrors and events ──
    // Async helpers take `&mut self`: the session is `Send` but not `Sync`.

    async fn publish_status(&mut self) {
        *self.shared.status.lock().await = self.conn.status();
    }

    async fn publish_role(&mut self) {
        let role = self.roles.role();
        self.model.observer_mut().set_role(role);
        *self.shared.role.lock().await = role;
        *self.shared.client_id.lock().await = self.roles.client_id().cloned();
    }

    async fn publish_game(&mut self) {
        *self.shared.game.lock().await = self.model.state().clone();
    }

    /// Emit an event, dropping it with a warning if the consumer is behind.
    fn emit(&self, event: ScoreboardEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// `Disconnected` is the last event and is never dropped.
    async fn emit_disconnected(&mut self, reason: Option<String>) {
        let event = ScoreboardEvent::Disconnected { reason };
        if self.event_tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
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
    use crate::credentials::MemoryCredentialStore;
    use crate::protocol::ClientType;
    use crate::transport::Transport;
    use async_trait::async_trait;

    /// A connector whose every attempt is refused.
    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> std::result::Result<Box<dyn Transport>, ScoreboardError> {
            Err(ScoreboardError::Connect("refused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connection_reports_reconnecting() {
        let config = ScoreboardConfig::new(ClientType::Board);
        let (mut client, mut events) =
            ScoreboardClient::start(RefusingConnector, MemoryCredentialStore::new(), config);

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            ScoreboardEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_millis(1000)
            }
        );
        assert_eq!(client.status().await, ConnectionStatus::Reconnecting);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let config = ScoreboardConfig::new(ClientType::Board);
        let (mut client, _events) =
            ScoreboardClient::start(RefusingConnector, MemoryCredentialStore::new(), config);

        client.shutdown().await;

        assert!(!client.is_running());
        let result = client.apply(Operation::BallUp);
        assert!(matches!(result, Err(ScoreboardError::NotConnected)));
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_last() {
        let config = ScoreboardConfig::new(ClientType::Board);
        let (mut client, mut events) =
            ScoreboardClient::start(RefusingConnector, MemoryCredentialStore::new(), config);

        client.shutdown().await;

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(
            last,
            Some(ScoreboardEvent::Disconnected {
                reason: Some("client shut down".into())
            })
        );
        assert_eq!(client.status().await, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let config = ScoreboardConfig::new(ClientType::Board);
        let (mut client, _events) =
            ScoreboardClient::start(RefusingConnector, MemoryCredentialStore::new(), config);
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let config = ScoreboardConfig::new(ClientType::Board);
        let (mut client, _events) =
            ScoreboardClient::start(RefusingConnector, MemoryCredentialStore::new(), config);
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("ScoreboardClient"));
        assert!(debug_str.contains("running"));
        client.shutdown().await;
    }
}
