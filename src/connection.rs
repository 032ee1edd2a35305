//! Connection lifecycle with exponential-backoff reconnection.
//!
//! [`ConnectionManager`] owns the one live [`Transport`] and the at most one
//! pending reconnect timer. The two never coexist: a timer is armed only
//! after the link is gone, and it is consumed by the attempt it triggers.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use crate::config::ReconnectPolicy;
use crate::error::{Result, ScoreboardError};
use crate::protocol::ClientMessage;
use crate::transport::{Connector, Transport};

/// Link status as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal. No timer is armed and nothing retries until an explicit restart.
    Disconnected,
}

/// What [`ConnectionManager::next_event`] resolved to.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One text frame from the relay.
    Message(String),
    /// The live connection ended.
    Closed { reason: Option<String> },
    /// The reconnect timer fired; `attempts` has already been bumped.
    ReconnectDue,
}

struct PendingReconnect {
    delay: Duration,
    sleep: Pin<Box<Sleep>>,
}

/// Owns the transport connection, the handshake-free part of the lifecycle
/// and the reconnect backoff.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    url: String,
    policy: ReconnectPolicy,
    status: ConnectionStatus,
    attempts: u32,
    pending: Option<PendingReconnect>,
    transport: Option<Box<dyn Transport>>,
}

impl ConnectionManager {
    pub fn new(connector: impl Connector, url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            connector: Box::new(connector),
            url: url.into(),
            policy,
            status: ConnectionStatus::Connecting,
            attempts: 0,
            pending: None,
            transport: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Failed retries since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a transport is currently open.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Delay of the armed reconnect timer, if one is armed.
    pub fn pending_delay(&self) -> Option<Duration> {
        self.pending.as_ref().map(|p| p.delay)
    }

    /// Try to open a connection. Returns `true` when the link is open.
    ///
    /// A construction failure is routed into [`schedule_reconnect`](Self::schedule_reconnect)
    /// exactly like an unexpected close.
    pub async fn connect(&mut self) -> bool {
        self.cancel_reconnect();
        self.transport = None;
        self.status = ConnectionStatus::Connecting;
        debug!(url = %self.url, attempt = self.attempts, "connecting to relay");

        match self.connector.connect(&self.url).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.status = ConnectionStatus::Connected;
                self.attempts = 0;
                info!(url = %self.url, "relay connection open");
                true
            }
            Err(e) => {
                warn!(url = %self.url, "failed to connect to relay: {e}");
                self.status = ConnectionStatus::Reconnecting;
                self.schedule_reconnect();
                false
            }
        }
    }

    /// Start over after a terminal disconnect.
    pub async fn restart(&mut self) -> bool {
        self.attempts = 0;
        self.connect().await
    }

    /// Handle the end of the live connection.
    pub fn on_close(&mut self) {
        self.transport = None;
        if self.status != ConnectionStatus::Disconnected {
            self.status = ConnectionStatus::Reconnecting;
            self.schedule_reconnect();
        }
    }

    /// Arm the reconnect timer for the current attempt count.
    ///
    /// Any earlier timer is cancelled first. Returns the armed delay, or
    /// `None` once the attempt budget is spent and the status went terminal.
    pub fn schedule_reconnect(&mut self) -> Option<Duration> {
        self.cancel_reconnect();
        if self.attempts >= self.policy.max_attempts {
            self.status = ConnectionStatus::Disconnected;
            error!(
                attempts = self.attempts,
                "giving up on relay connection after maximum reconnect attempts"
            );
            return None;
        }
        let delay = self.policy.delay_for(self.attempts);
        info!(
            attempt = self.attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        self.pending = Some(PendingReconnect {
            delay,
            sleep: Box::pin(tokio::time::sleep(delay)),
        });
        Some(delay)
    }

    /// Disarm the reconnect timer. Idempotent.
    pub fn cancel_reconnect(&mut self) {
        if self.pending.take().is_some() {
            debug!("reconnect timer cancelled");
        }
    }

    /// Wait for the next thing that happens on the link.
    ///
    /// Pends forever while the manager is terminal and idle. Cancel-safe: the
    /// timer lives in `self` and [`Transport::recv`] is cancel-safe.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        if let Some(transport) = self.transport.as_mut() {
            return match transport.recv().await {
                Some(Ok(text)) => ConnectionEvent::Message(text),
                Some(Err(e)) => ConnectionEvent::Closed {
                    reason: Some(format!("transport receive error: {e}")),
                },
                None => ConnectionEvent::Closed { reason: None },
            };
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.sleep.as_mut().await;
            self.pending = None;
            self.attempts += 1;
            return ConnectionEvent::ReconnectDue;
        }
        std::future::pending::<ConnectionEvent>().await
    }

    /// Serialize and send one envelope.
    ///
    /// # Errors
    ///
    /// [`ScoreboardError::TransportClosed`] if no link is open. A failing
    /// send drops the link through [`on_close`](Self::on_close) and returns
    /// the transport error.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(ScoreboardError::TransportClosed);
        };
        if let Err(e) = transport.send(json).await {
            error!("transport send error: {e}");
            self.on_close();
            return Err(e);
        }
        Ok(())
    }

    /// Cancel reconnection and close the live connection, if any.
    pub async fn shutdown(&mut self) {
        self.cancel_reconnect();
        self.status = ConnectionStatus::Disconnected;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("error closing transport: {e}");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .field("pending_delay", &self.pending_delay())
            .field("open", &self.is_open())
            .finish()
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
    use crate::protocol::ClientType;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::sync::mpsc;

    // ── Mock transport ──────────────────────────────────────────────

    struct ChannelTransport {
        incoming: mpsc::UnboundedReceiver<std::result::Result<String, ScoreboardError>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ScoreboardError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ScoreboardError>> {
            self.incoming.recv().await
        }

        async fn close(&mut self) -> std::result::Result<(), ScoreboardError> {
            Ok(())
        }
    }

    /// Hands out scripted outcomes; `None` entries fail, and an empty
    /// script fails too.
    struct ScriptedConnector {
        script: StdMutex<VecDeque<Option<ChannelTransport>>>,
        calls: Arc<StdMutex<Vec<tokio::time::Instant>>>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Option<ChannelTransport>>) -> (Self, Arc<StdMutex<Vec<tokio::time::Instant>>>) {
            let calls = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    script: StdMutex::new(VecDeque::from(script)),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _url: &str) -> std::result::Result<Box<dyn Transport>, ScoreboardError> {
            self.calls.lock().unwrap().push(tokio::time::Instant::now());
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(transport) => Ok(Box::new(transport)),
                None => Err(ScoreboardError::Connect("refused".into())),
            }
        }
    }

    type Inbound = mpsc::UnboundedSender<std::result::Result<String, ScoreboardError>>;

    fn channel_transport() -> (ChannelTransport, Inbound, Arc<StdMutex<Vec<String>>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        (
            ChannelTransport {
                incoming: rx,
                sent: Arc::clone(&sent),
            },
            tx,
            sent,
        )
    }

    fn manager(script: Vec<Option<ChannelTransport>>) -> (ConnectionManager, Arc<StdMutex<Vec<tokio::time::Instant>>>) {
        let (connector, calls) = ScriptedConnector::new(script);
        (
            ConnectionManager::new(connector, "ws://relay/ws", ReconnectPolicy::default()),
            calls,
        )
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn successful_open_resets_attempts() {
        let (transport, _tx, _sent) = channel_transport();
        let (mut conn, _calls) = manager(vec![None, Some(transport)]);

        assert!(!conn.connect().await);
        assert_eq!(conn.status(), ConnectionStatus::Reconnecting);
        assert_eq!(conn.pending_delay(), Some(Duration::from_millis(1000)));

        assert_eq!(conn.next_event().await, ConnectionEvent::ReconnectDue);
        assert_eq!(conn.attempts(), 1);

        assert!(conn.connect().await);
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert_eq!(conn.attempts(), 0);
        assert!(conn.pending_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_ten_failed_attempts() {
        let (mut conn, calls) = manager(vec![]);

        let mut delays = Vec::new();
        assert!(!conn.connect().await);
        delays.push(conn.pending_delay().unwrap());
        while conn.status() != ConnectionStatus::Disconnected {
            assert_eq!(conn.next_event().await, ConnectionEvent::ReconnectDue);
            assert!(!conn.connect().await);
            if let Some(delay) = conn.pending_delay() {
                delays.push(delay);
            }
        }

        let millis: Vec<u128> = delays.iter().map(Duration::as_millis).collect();
        assert_eq!(
            millis,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
        assert_eq!(conn.attempts(), 10);
        assert!(conn.pending_delay().is_none());
        // Initial attempt plus ten retries.
        assert_eq!(calls.lock().unwrap().len(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_backoff_delay() {
        let (mut conn, calls) = manager(vec![]);
        conn.connect().await;
        conn.next_event().await;
        conn.connect().await;
        conn.next_event().await;
        conn.connect().await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1] - calls[0], Duration::from_millis(1000));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn schedule_replaces_existing_timer() {
        let (mut conn, _calls) = manager(vec![]);
        conn.schedule_reconnect();
        conn.schedule_reconnect();
        assert_eq!(conn.pending_delay(), Some(Duration::from_millis(1000)));

        conn.cancel_reconnect();
        conn.cancel_reconnect();
        assert!(conn.pending_delay().is_none());
    }

    #[tokio::test]
    async fn close_schedules_reconnect_unless_terminal() {
        let (transport, tx, _sent) = channel_transport();
        let (mut conn, _calls) = manager(vec![Some(transport)]);
        assert!(conn.connect().await);

        drop(tx);
        assert_eq!(
            conn.next_event().await,
            ConnectionEvent::Closed { reason: None }
        );
        conn.on_close();
        assert_eq!(conn.status(), ConnectionStatus::Reconnecting);
        assert!(conn.pending_delay().is_some());

        conn.shutdown().await;
        conn.on_close();
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert!(conn.pending_delay().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn receive_error_closes_and_schedules_reconnect() {
        let (transport, tx, _sent) = channel_transport();
        let (mut conn, calls) = manager(vec![Some(transport)]);
        assert!(conn.connect().await);

        tx.send(Err(ScoreboardError::TransportReceive("reset by peer".into())))
            .unwrap();
        let ConnectionEvent::Closed { reason } = conn.next_event().await else {
            panic!("expected Closed");
        };
        assert!(reason.unwrap().contains("reset by peer"));

        conn.on_close();
        assert!(!conn.is_open());
        assert_eq!(conn.status(), ConnectionStatus::Reconnecting);
        assert_eq!(conn.pending_delay(), Some(Duration::from_millis(1000)));

        assert_eq!(conn.next_event().await, ConnectionEvent::ReconnectDue);
        assert!(!conn.connect().await);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn messages_and_sends_flow_through_open_link() {
        let (transport, tx, sent) = channel_transport();
        let (mut conn, _calls) = manager(vec![Some(transport)]);
        assert!(conn.connect().await);

        tx.send(Ok("{\"top\":true}".into())).unwrap();
        assert_eq!(
            conn.next_event().await,
            ConnectionEvent::Message("{\"top\":true}".into())
        );

        conn.send(&ClientMessage::Handshake {
            client_type: ClientType::Operation,
            master_token: None,
        })
        .await
        .unwrap();
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_without_link_is_transport_closed() {
        let (mut conn, _calls) = manager(vec![]);
        let err = conn.send(&ClientMessage::ReleaseMaster).await.unwrap_err();
        assert!(matches!(err, ScoreboardError::TransportClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_terminal_disconnect() {
        let (transport, _tx, _sent) = channel_transport();
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        let (connector, _calls) = ScriptedConnector::new(vec![None, Some(transport)]);
        let mut conn = ConnectionManager::new(connector, "ws://relay/ws", policy);

        assert!(!conn.connect().await);
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert!(conn.restart().await);
        assert_eq!(conn.status(), ConnectionStatus::Connected);
    }
}
