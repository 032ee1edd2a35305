//! Loop-safe state propagation between clients.
//!
//! Outbound, [`SyncBroadcaster`] is the [`StateObserver`] hung on the local
//! [`GameStateModel`]: every change made while this client is master and
//! linked queues a full snapshot for the relay.
//!
//! Inbound, [`apply_remote_state`] merges a received patch by field presence
//! and arms the broadcaster's one-shot echo flag first, so the change
//! notification produced by the merge is swallowed instead of bouncing back
//! to the relay.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::game::{GameState, GameStateModel, StateObserver};
use crate::protocol::{ClientMessage, Role, StatePatch};

/// The model type the client session runs.
pub type SyncedModel = GameStateModel<SyncBroadcaster>;

/// Turns local state changes into outbound `game_state_update` envelopes.
#[derive(Debug, Default)]
pub struct SyncBroadcaster {
    role: Role,
    link_open: bool,
    echo_pending: bool,
    outbox: VecDeque<ClientMessage>,
}

impl SyncBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn set_link_open(&mut self, open: bool) {
        self.link_open = open;
    }

    /// Whether the next change notification will be treated as an echo.
    pub fn echo_pending(&self) -> bool {
        self.echo_pending
    }

    /// Pop the next envelope waiting to be sent.
    pub fn take_outbound(&mut self) -> Option<ClientMessage> {
        self.outbox.pop_front()
    }

    fn mark_remote_update(&mut self) {
        self.echo_pending = true;
    }

    fn clear_remote_update(&mut self) {
        self.echo_pending = false;
    }
}

impl StateObserver for SyncBroadcaster {
    fn state_changed(&mut self, state: &GameState) {
        if self.echo_pending {
            self.echo_pending = false;
            trace!("suppressing rebroadcast of remote update");
            return;
        }
        if self.role != Role::Master {
            trace!(role = %self.role, "not broadcasting: not master");
            return;
        }
        if !self.link_open {
            debug!("not broadcasting: relay link is down");
            return;
        }
        self.outbox.push_back(ClientMessage::GameStateUpdate {
            board_data: state.clone(),
        });
    }
}

/// Merge a received payload into `model`. Returns `true` if anything changed.
///
/// The echo flag stays armed only when the merge produced a notification to
/// consume; a no-op merge disarms it again.
pub fn apply_remote_state(model: &mut SyncedModel, patch: &StatePatch) -> bool {
    model.observer_mut().mark_remote_update();
    let changed = model.merge(patch);
    if !changed {
        model.observer_mut().clear_remote_update();
    }
    changed
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
    use crate::game::Operation;

    fn master_model() -> SyncedModel {
        let mut broadcaster = SyncBroadcaster::new();
        broadcaster.set_role(Role::Master);
        broadcaster.set_link_open(true);
        GameStateModel::with_observer(GameState::default(), broadcaster)
    }

    #[test]
    fn master_change_queues_full_snapshot() {
        let mut model = master_model();
        model.apply(&Operation::ScoreTopUp);

        let msg = model.observer_mut().take_outbound().unwrap();
        let ClientMessage::GameStateUpdate { board_data } = msg else {
            panic!("expected game_state_update, got {msg:?}");
        };
        assert_eq!(board_data.score_top, 1);
        assert_eq!(board_data.last_inning, 9);
        assert!(model.observer_mut().take_outbound().is_none());
    }

    #[test]
    fn slave_never_broadcasts() {
        let mut model = master_model();
        model.observer_mut().set_role(Role::Slave);
        model.apply(&Operation::ScoreTopUp);
        assert!(model.observer_mut().take_outbound().is_none());
    }

    #[test]
    fn closed_link_skips_broadcast() {
        let mut model = master_model();
        model.observer_mut().set_link_open(false);
        model.apply(&Operation::OutUp);
        assert!(model.observer_mut().take_outbound().is_none());
    }

    #[test]
    fn remote_update_is_not_rebroadcast() {
        let mut model = master_model();
        let patch = StatePatch {
            ball_cnt: Some(2),
            ..StatePatch::default()
        };
        assert!(apply_remote_state(&mut model, &patch));
        assert_eq!(model.state().balls, 2);
        assert!(model.observer_mut().take_outbound().is_none());
        assert!(!model.observer().echo_pending());

        // The next local change broadcasts normally.
        model.apply(&Operation::BallUp);
        assert!(model.observer_mut().take_outbound().is_some());
    }

    #[test]
    fn zero_and_false_are_present_values() {
        let mut model = master_model();
        model.apply(&Operation::OutUp);
        model.apply(&Operation::OutUp);
        model.apply(&Operation::ToggleBase(crate::game::Base::First));
        while model.observer_mut().take_outbound().is_some() {}

        let patch: StatePatch = serde_json::from_str(r#"{"out_cnt":0,"first_base":false}"#).unwrap();
        assert!(apply_remote_state(&mut model, &patch));
        assert_eq!(model.state().outs, 0);
        assert!(!model.state().bases.first);
    }

    #[test]
    fn no_op_remote_update_does_not_swallow_next_local_change() {
        let mut model = master_model();
        let patch = StatePatch {
            ball_cnt: Some(0),
            ..StatePatch::default()
        };
        assert!(!apply_remote_state(&mut model, &patch));
        assert!(!model.observer().echo_pending());

        model.apply(&Operation::StrikeUp);
        assert!(model.observer_mut().take_outbound().is_some());
    }
}
