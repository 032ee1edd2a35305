#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style session tests.
//!
//! A scripted `MockConnector` from `tests/common` stands in for the relay so
//! each test can drive role envelopes and state payloads into a running
//! `ScoreboardClient` and inspect what it sends back. Backoff timings run on
//! tokio's paused clock.

mod common;

use std::collections::VecDeque;
use std::time::Duration;

use scoreboard_sync::protocol::ClientId;
use scoreboard_sync::{
    ClientType, ConnectionStatus, CredentialStore, GameState, MemoryCredentialStore, Operation,
    ReconnectPolicy, Role, ScoreboardClient, ScoreboardConfig, ScoreboardError, ScoreboardEvent,
    StateOrigin,
};
use serde_json::json;
use tokio::sync::mpsc::Receiver;

use common::{
    game_state_json, mock_relay, role_assignment_json, role_changed_json, Attempt, ConnectLog,
    RelayLink,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

struct Harness {
    client: ScoreboardClient,
    events: Receiver<ScoreboardEvent>,
    links: VecDeque<RelayLink>,
    calls: ConnectLog,
    store: MemoryCredentialStore,
}

fn start_with(script: &[Attempt], config: ScoreboardConfig, store: MemoryCredentialStore) -> Harness {
    let (connector, links, calls) = mock_relay(script);
    let (client, events) = ScoreboardClient::start(connector, store.clone(), config);
    Harness {
        client,
        events,
        links,
        calls,
        store,
    }
}

fn start(script: &[Attempt], client_type: ClientType) -> Harness {
    start_with(
        script,
        ScoreboardConfig::new(client_type),
        MemoryCredentialStore::new(),
    )
}

async fn next_event(events: &mut Receiver<ScoreboardEvent>) -> ScoreboardEvent {
    events.recv().await.expect("event channel closed")
}

/// Consume `Connected` and the handshake, then hand out the given role.
async fn open_as(h: &mut Harness, role: Role, token: Option<&str>) -> RelayLink {
    let mut link = h.links.pop_front().expect("no scripted link left");
    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::Connected);
    assert_eq!(link.next_sent().await["type"], "handshake");

    link.push(role_assignment_json(role, 1, token));
    let ev = next_event(&mut h.events).await;
    assert!(
        matches!(ev, ScoreboardEvent::RoleAssigned { role: r, .. } if r == role),
        "expected RoleAssigned({role}), got {ev:?}"
    );
    link
}

async fn next_state(events: &mut Receiver<ScoreboardEvent>, origin: StateOrigin) -> GameState {
    match next_event(events).await {
        ScoreboardEvent::StateChanged { state, origin: o } if o == origin => state,
        other => panic!("expected StateChanged({origin:?}), got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Handshake and role assignment
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn first_handshake_has_no_token_and_master_token_is_stored() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let mut link = h.links.pop_front().unwrap();

    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::Connected);
    assert_eq!(
        link.next_sent().await,
        json!({ "type": "handshake", "clientType": "operation" })
    );

    link.push(role_assignment_json(Role::Master, 1, Some("T1")));
    assert_eq!(
        next_event(&mut h.events).await,
        ScoreboardEvent::RoleAssigned {
            role: Role::Master,
            client_id: ClientId::Number(1),
            master_client_id: Some(ClientId::Number(1)),
        }
    );

    assert_eq!(h.store.get().as_deref(), Some("T1"));
    assert_eq!(h.client.role().await, Role::Master);
    assert_eq!(h.client.client_id().await, Some(ClientId::Number(1)));
    assert_eq!(h.client.status().await, ConnectionStatus::Connected);
    assert!(!h.client.operations_disabled().await);

    h.client.shutdown().await;
}

#[tokio::test]
async fn stored_token_is_presented_on_first_handshake() {
    let mut h = start_with(
        &[Attempt::Accept],
        ScoreboardConfig::new(ClientType::Operation),
        MemoryCredentialStore::with_token("T0"),
    );
    let mut link = h.links.pop_front().unwrap();

    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::Connected);
    assert_eq!(
        link.next_sent().await,
        json!({ "type": "handshake", "clientType": "operation", "masterToken": "T0" })
    );

    h.client.shutdown().await;
}

#[tokio::test]
async fn board_client_is_read_only_viewer() {
    let mut h = start(&[Attempt::Accept], ClientType::Board);
    let mut link = h.links.pop_front().unwrap();

    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::Connected);
    assert_eq!(link.next_sent().await["clientType"], "board");

    link.push(role_assignment_json(Role::Viewer, 5, None));
    let _assigned = next_event(&mut h.events).await;
    assert!(h.client.operations_disabled().await);

    h.client.apply(Operation::BallUp).unwrap();
    assert_eq!(
        next_event(&mut h.events).await,
        ScoreboardEvent::OperationRefused {
            operation: Operation::BallUp
        }
    );

    h.client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Authorisation and broadcast
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn slave_operation_is_refused_and_nothing_is_sent() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let mut link = open_as(&mut h, Role::Slave, Some("ignored")).await;

    assert!(h.store.get().is_none());

    h.client.apply(Operation::ScoreTopUp).unwrap();
    assert_eq!(
        next_event(&mut h.events).await,
        ScoreboardEvent::OperationRefused {
            operation: Operation::ScoreTopUp
        }
    );

    assert_eq!(h.client.game_state().await, GameState::default());
    assert!(link.try_sent().is_none());

    h.client.shutdown().await;
}

#[tokio::test]
async fn master_change_broadcasts_full_snapshot() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let mut link = open_as(&mut h, Role::Master, Some("T1")).await;

    h.client.apply(Operation::ScoreTopUp).unwrap();
    let state = next_state(&mut h.events, StateOrigin::Local).await;
    assert_eq!(state.score_top, 1);

    let sent = link.next_sent().await;
    assert_eq!(sent["type"], "game_state_update");
    let board = sent["boardData"].as_object().unwrap();
    for key in [
        "game_title",
        "team_top",
        "team_bottom",
        "game_inning",
        "top",
        "first_base",
        "second_base",
        "third_base",
        "ball_cnt",
        "strike_cnt",
        "out_cnt",
        "score_top",
        "score_bottom",
        "last_inning",
    ] {
        assert!(board.contains_key(key), "snapshot is missing `{key}`");
    }
    assert_eq!(board["score_top"], 1);
    assert_eq!(board["last_inning"], 9);

    assert_eq!(h.client.game_state().await.score_top, 1);

    h.client.shutdown().await;
}

#[tokio::test]
async fn clamped_no_op_emits_nothing() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let mut link = open_as(&mut h, Role::Master, None).await;

    // Already zero: no change, no event, no broadcast.
    h.client.apply(Operation::BallDown).unwrap();
    h.client.apply(Operation::StrikeUp).unwrap();

    let state = next_state(&mut h.events, StateOrigin::Local).await;
    assert_eq!(state.strikes, 1);
    assert_eq!(link.next_sent().await["boardData"]["strike_cnt"], 1);

    h.client.shutdown().await;
}

#[tokio::test]
async fn remote_state_is_applied_but_not_rebroadcast() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let mut link = open_as(&mut h, Role::Master, Some("T1")).await;

    link.push(game_state_json(json!({ "ball_cnt": 2, "team_top": "Hawks" })));
    let state = next_state(&mut h.events, StateOrigin::Remote).await;
    assert_eq!(state.balls, 2);
    assert_eq!(state.team_top, "Hawks");

    // The first thing sent after the remote update is the local change.
    h.client.apply(Operation::StrikeUp).unwrap();
    let _ = next_state(&mut h.events, StateOrigin::Local).await;
    let sent = link.next_sent().await;
    assert_eq!(sent["type"], "game_state_update");
    assert_eq!(sent["boardData"]["ball_cnt"], 2);
    assert_eq!(sent["boardData"]["strike_cnt"], 1);

    h.client.shutdown().await;
}

#[tokio::test]
async fn zero_out_count_from_legacy_payload_is_merged() {
    let initial = GameState {
        outs: 2,
        inning: 3,
        ..GameState::default()
    };
    let mut h = start_with(
        &[Attempt::Accept],
        ScoreboardConfig::new(ClientType::Operation).with_initial_state(initial),
        MemoryCredentialStore::new(),
    );
    let link = open_as(&mut h, Role::Slave, None).await;

    link.push(r#"{"out_cnt":0}"#);
    let state = next_state(&mut h.events, StateOrigin::Remote).await;
    assert_eq!(state.outs, 0);
    assert_eq!(state.inning, 3);

    h.client.shutdown().await;
}

#[tokio::test]
async fn malformed_frame_is_skipped() {
    let mut h = start(&[Attempt::Accept], ClientType::Board);
    let link = open_as(&mut h, Role::Viewer, None).await;

    link.push("not json at all");
    link.push(r#"{"type":"mystery"}"#);
    link.push(game_state_json(json!({ "score_bottom": 4 })));

    let state = next_state(&mut h.events, StateOrigin::Remote).await;
    assert_eq!(state.score_bottom, 4);
    assert!(h.client.is_running());

    h.client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Release and failover
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn release_master_clears_token_and_waits_for_confirmation() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let mut link = open_as(&mut h, Role::Master, Some("T1")).await;

    h.client.release_master().unwrap();
    assert_eq!(link.next_sent().await, json!({ "type": "release_master" }));
    assert!(h.store.get().is_none());
    assert_eq!(h.client.role().await, Role::Master);

    link.push(role_changed_json(Role::Slave, "released", None, true));
    assert_eq!(
        next_event(&mut h.events).await,
        ScoreboardEvent::RoleChanged {
            role: Role::Slave,
            reason: Some("released".into())
        }
    );
    assert!(h.client.operations_disabled().await);

    h.client.shutdown().await;
}

#[tokio::test]
async fn slave_release_is_ignored_then_promotion_enables_operations() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let mut link = open_as(&mut h, Role::Slave, None).await;

    h.client.release_master().unwrap();

    link.push(role_changed_json(Role::Master, "master_disconnected", Some("T2"), false));
    let _ = next_event(&mut h.events).await;
    assert_eq!(h.store.get().as_deref(), Some("T2"));

    h.client.apply(Operation::OutUp).unwrap();
    let _ = next_state(&mut h.events, StateOrigin::Local).await;
    // The ignored release sent nothing, so the update comes first.
    assert_eq!(link.next_sent().await["type"], "game_state_update");

    h.client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn reconnect_backs_off_and_reclaims_with_token() {
    let mut h = start(
        &[Attempt::Accept, Attempt::Refuse, Attempt::Accept],
        ClientType::Operation,
    );
    let link = open_as(&mut h, Role::Master, Some("T1")).await;

    drop(link);
    assert_eq!(
        next_event(&mut h.events).await,
        ScoreboardEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(1000)
        }
    );
    assert_eq!(
        next_event(&mut h.events).await,
        ScoreboardEvent::Reconnecting {
            attempt: 2,
            delay: Duration::from_millis(2000)
        }
    );
    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::Connected);

    let mut link = h.links.pop_front().unwrap();
    assert_eq!(
        link.next_sent().await,
        json!({ "type": "handshake", "clientType": "operation", "masterToken": "T1" })
    );

    {
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_millis(1000));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(2000));
    }

    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn role_survives_a_drop_but_offline_changes_are_not_sent() {
    let mut h = start(&[Attempt::Accept, Attempt::Accept], ClientType::Operation);
    let link = open_as(&mut h, Role::Master, Some("T1")).await;

    drop(link);
    let ev = next_event(&mut h.events).await;
    assert!(matches!(ev, ScoreboardEvent::Reconnecting { attempt: 1, .. }));
    assert_eq!(h.client.role().await, Role::Master);

    h.client.apply(Operation::BallUp).unwrap();
    let state = next_state(&mut h.events, StateOrigin::Local).await;
    assert_eq!(state.balls, 1);

    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::Connected);
    let mut link = h.links.pop_front().unwrap();
    let first = link.next_sent().await;
    assert_eq!(first["type"], "handshake");
    assert_eq!(first["masterToken"], "T1");
    assert!(link.try_sent().is_none());

    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_ten_attempts_until_restart() {
    let mut script = vec![Attempt::Refuse; 11];
    script.push(Attempt::Accept);
    let mut h = start(&script, ClientType::Operation);

    let mut delays = Vec::new();
    for attempt in 1..=10 {
        match next_event(&mut h.events).await {
            ScoreboardEvent::Reconnecting { attempt: a, delay } => {
                assert_eq!(a, attempt);
                delays.push(delay.as_millis());
            }
            other => panic!("expected Reconnecting, got {other:?}"),
        }
    }
    assert_eq!(
        delays,
        vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
    );
    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::ConnectionLost);
    assert_eq!(h.client.status().await, ConnectionStatus::Disconnected);
    assert_eq!(h.calls.lock().unwrap().len(), 11);

    // Nothing retries on its own any more.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.calls.lock().unwrap().len(), 11);

    h.client.restart().unwrap();
    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::Connected);
    assert_eq!(h.client.status().await, ConnectionStatus::Connected);

    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn custom_policy_limits_attempts() {
    let policy = ReconnectPolicy {
        base_delay: Duration::from_millis(100),
        cap_delay: Duration::from_millis(150),
        max_attempts: 2,
    };
    let mut h = start_with(
        &[],
        ScoreboardConfig::new(ClientType::Board).with_reconnect_policy(policy),
        MemoryCredentialStore::new(),
    );

    let expected = [(1, 100), (2, 150)];
    for (attempt, millis) in expected {
        assert_eq!(
            next_event(&mut h.events).await,
            ScoreboardEvent::Reconnecting {
                attempt,
                delay: Duration::from_millis(millis)
            }
        );
    }
    assert_eq!(next_event(&mut h.events).await, ScoreboardEvent::ConnectionLost);

    h.client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Shutdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shutdown_closes_link_and_emits_disconnected() {
    let mut h = start(&[Attempt::Accept], ClientType::Operation);
    let link = open_as(&mut h, Role::Master, Some("T1")).await;

    h.client.shutdown().await;

    assert!(link.is_closed());
    assert_eq!(
        next_event(&mut h.events).await,
        ScoreboardEvent::Disconnected {
            reason: Some("client shut down".into())
        }
    );
    assert!(h.events.recv().await.is_none());
    assert!(!h.client.is_running());
    assert_eq!(h.client.status().await, ConnectionStatus::Disconnected);

    let err = h.client.apply(Operation::BallUp).unwrap_err();
    assert!(matches!(err, ScoreboardError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_reconnect() {
    let mut h = start(&[], ClientType::Operation);
    let ev = next_event(&mut h.events).await;
    assert!(matches!(ev, ScoreboardEvent::Reconnecting { .. }));

    h.client.shutdown().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.calls.lock().unwrap().len(), 1);
}
