//! Events emitted by the scoreboard client session.

use std::time::Duration;

use crate::game::{GameState, Operation};
use crate::protocol::{ClientId, Role};

/// Where a state change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOrigin {
    /// An operator operation on this client.
    Local,
    /// A snapshot received from the relay.
    Remote,
}

/// Events delivered on the receiver returned by
/// [`ScoreboardClient::start`](crate::ScoreboardClient::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreboardEvent {
    /// A relay connection opened and the handshake was queued.
    Connected,
    /// The link is down and a reconnect attempt is scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect attempts are exhausted. Nothing retries until
    /// [`ScoreboardClient::restart`](crate::ScoreboardClient::restart).
    ConnectionLost,
    /// The relay assigned this client its role after the handshake.
    RoleAssigned {
        role: Role,
        client_id: ClientId,
        master_client_id: Option<ClientId>,
    },
    /// The relay changed this client's role.
    RoleChanged { role: Role, reason: Option<String> },
    /// The live scoreboard changed.
    StateChanged { state: GameState, origin: StateOrigin },
    /// An operation was refused because this client may not mutate state.
    OperationRefused { operation: Operation },
    /// The session ended. Always the last event.
    Disconnected { reason: Option<String> },
}
