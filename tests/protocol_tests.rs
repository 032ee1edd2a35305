#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests against JSON fixtures shaped like real relay traffic.

use scoreboard_sync::protocol::{ClientId, RoleAssignment, RoleChanged, StatePatch};
use scoreboard_sync::{
    Base, ClientMessage, ClientType, GameState, GameStateModel, Role, ScoreboardError,
    ServerMessage,
};
use serde_json::{json, Value};

fn to_value<T: serde::Serialize>(val: &T) -> Value {
    serde_json::to_value(val).expect("serialize")
}

fn parse(text: &str) -> ServerMessage {
    tokio_test::assert_ok!(ServerMessage::parse(text), "{}", text)
}

// ════════════════════════════════════════════════════════════════════
// Client → relay
// ════════════════════════════════════════════════════════════════════

#[test]
fn handshake_omits_absent_token() {
    let msg = ClientMessage::Handshake {
        client_type: ClientType::Board,
        master_token: None,
    };
    assert_eq!(to_value(&msg), json!({ "type": "handshake", "clientType": "board" }));
}

#[test]
fn handshake_carries_token() {
    let msg = ClientMessage::Handshake {
        client_type: ClientType::Operation,
        master_token: Some("T1".into()),
    };
    assert_eq!(
        to_value(&msg),
        json!({ "type": "handshake", "clientType": "operation", "masterToken": "T1" })
    );
}

#[test]
fn release_master_is_bare_envelope() {
    assert_eq!(
        to_value(&ClientMessage::ReleaseMaster),
        json!({ "type": "release_master" })
    );
}

#[test]
fn state_update_uses_relay_field_names() {
    let mut state = GameState {
        title: "Final".into(),
        team_top: "Hawks".into(),
        team_bottom: "Owls".into(),
        inning: 7,
        top: false,
        balls: 3,
        strikes: 1,
        outs: 2,
        score_top: 4,
        score_bottom: 5,
        ..GameState::default()
    };
    state.set_base(Base::Second, true);

    let value = to_value(&ClientMessage::GameStateUpdate { board_data: state });
    assert_eq!(
        value,
        json!({
            "type": "game_state_update",
            "boardData": {
                "game_title": "Final",
                "team_top": "Hawks",
                "team_bottom": "Owls",
                "game_inning": 7,
                "top": false,
                "first_base": false,
                "second_base": true,
                "third_base": false,
                "ball_cnt": 3,
                "strike_cnt": 1,
                "out_cnt": 2,
                "score_top": 4,
                "score_bottom": 5,
                "last_inning": 9
            }
        })
    );

    let back: ClientMessage = serde_json::from_value(value).unwrap();
    assert!(matches!(back, ClientMessage::GameStateUpdate { .. }));
}

// ════════════════════════════════════════════════════════════════════
// Relay → client
// ════════════════════════════════════════════════════════════════════

#[test]
fn role_assignment_with_numeric_ids() {
    let msg = parse(
        r#"{"type":"role_assignment","role":"master","clientId":3,"masterClientId":3,"masterToken":"T1"}"#,
    );
    assert_eq!(
        msg,
        ServerMessage::RoleAssignment(RoleAssignment {
            role: Role::Master,
            client_id: ClientId::Number(3),
            master_client_id: Some(ClientId::Number(3)),
            master_token: Some("T1".into()),
        })
    );
}

#[test]
fn role_assignment_with_string_id_and_no_master() {
    let msg = parse(r#"{"type":"role_assignment","role":"viewer","clientId":"board-1","masterClientId":null}"#);
    let ServerMessage::RoleAssignment(assignment) = msg else {
        panic!("expected role_assignment, got {msg:?}");
    };
    assert_eq!(assignment.role, Role::Viewer);
    assert_eq!(assignment.client_id, ClientId::from("board-1"));
    assert!(assignment.master_client_id.is_none());
    assert!(assignment.master_token.is_none());
}

#[test]
fn role_changed_with_clear_token() {
    let msg = parse(r#"{"type":"role_changed","newRole":"slave","reason":"released","clearToken":true}"#);
    assert_eq!(
        msg,
        ServerMessage::RoleChanged(RoleChanged {
            new_role: Role::Slave,
            reason: Some("released".into()),
            client_id: None,
            master_client_id: None,
            master_token: None,
            clear_token: Some(true),
        })
    );
}

#[test]
fn game_state_payload_locations() {
    let expected = StatePatch {
        ball_cnt: Some(1),
        ..StatePatch::default()
    };
    for text in [
        r#"{"type":"game_state","boardData":{"ball_cnt":1}}"#,
        r#"{"type":"game_state","data":{"ball_cnt":1}}"#,
        r#"{"type":"game_state","ball_cnt":1}"#,
        r#"{"ball_cnt":1}"#,
    ] {
        assert_eq!(parse(text), ServerMessage::GameState(expected.clone()), "{text}");
    }
}

#[test]
fn boolean_false_and_zero_are_present() {
    let ServerMessage::GameState(patch) = parse(r#"{"out_cnt":0,"top":false}"#) else {
        panic!("expected game_state");
    };
    assert_eq!(patch.out_cnt, Some(0));
    assert_eq!(patch.top, Some(false));
    assert!(patch.ball_cnt.is_none());
}

#[test]
fn null_field_is_absent() {
    let ServerMessage::GameState(patch) = parse(r#"{"type":"game_state","boardData":{"score_top":null}}"#) else {
        panic!("expected game_state");
    };
    assert!(patch.is_empty());
}

#[test]
fn unknown_type_is_rejected() {
    let err = ServerMessage::parse(r#"{"type":"chat","text":"hi"}"#).unwrap_err();
    assert!(matches!(err, ScoreboardError::Serialization(_)));
    assert!(err.to_string().contains("chat"));
}

#[test]
fn non_object_and_non_string_type_are_rejected() {
    for text in ["[1,2,3]", "42", r#"{"type":7}"#, "{", ""] {
        assert!(ServerMessage::parse(text).is_err(), "{text} should not parse");
    }
}

#[test]
fn mistyped_field_is_rejected() {
    tokio_test::assert_err!(ServerMessage::parse(r#"{"ball_cnt":"two"}"#));
}

// ════════════════════════════════════════════════════════════════════
// Merge semantics
// ════════════════════════════════════════════════════════════════════

#[test]
fn out_of_range_numbers_are_clamped() {
    let ServerMessage::GameState(patch) =
        parse(r#"{"ball_cnt":99,"strike_cnt":5,"out_cnt":-3,"score_top":-1}"#)
    else {
        panic!("expected game_state");
    };
    let mut model = GameStateModel::new(GameState::default());
    assert!(model.merge(&patch));

    let state = model.state();
    assert_eq!(state.balls, 3);
    assert_eq!(state.strikes, 2);
    assert_eq!(state.outs, 0);
    assert_eq!(state.score_top, 0);
}

#[test]
fn snapshot_patch_reproduces_state() {
    let source = GameState {
        title: "Spring Cup".into(),
        inning: 10,
        last_inning: 12,
        top: false,
        score_bottom: 8,
        ..GameState::default()
    };
    let mut model = GameStateModel::new(GameState::default());
    assert!(model.merge(&StatePatch::from(&source)));
    assert_eq!(model.state(), &source);
}

#[test]
fn inning_is_limited_to_final_inning() {
    let ServerMessage::GameState(patch) = parse(r#"{"game_inning":40,"last_inning":7}"#) else {
        panic!("expected game_state");
    };
    let mut model = GameStateModel::new(GameState::default());
    model.merge(&patch);
    assert_eq!(model.state().last_inning, 7);
    assert_eq!(model.state().inning, 8);
}
