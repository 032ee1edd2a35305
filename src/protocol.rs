//! Wire-compatible envelope types for the scoreboard relay protocol.
//!
//! Every envelope is a JSON object with a `type` discriminator. The relay's
//! oldest clients sent bare state objects with no `type` at all; that legacy
//! shape is resolved once, here, into [`ServerMessage::GameState`] and never
//! re-checked elsewhere.
//!
//! | `type`              | direction      |
//! |---------------------|----------------|
//! | `handshake`         | client → relay |
//! | `game_state_update` | client → relay |
//! | `release_master`    | client → relay |
//! | `role_assignment`   | relay → client |
//! | `role_changed`      | relay → client |
//! | `game_state` / none | relay → client |

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::game::GameState;

/// Opaque reclaim credential issued by the relay to the master.
pub type MasterToken = String;

// ── Identity ────────────────────────────────────────────────────────

/// Relay-assigned client identifier. The relay may send numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientId::Number(n) => write!(f, "{n}"),
            ClientId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ClientId {
    fn from(value: u64) -> Self {
        ClientId::Number(value)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        ClientId::Text(value.to_owned())
    }
}

/// Declared kind of a connecting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Operator control panel; may be granted mastership.
    Operation,
    /// Passive display board.
    Board,
}

/// Role granted by the relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// No assignment received yet.
    #[default]
    Unassigned,
    /// The single client authorised to mutate state.
    Master,
    /// A read-only operator panel.
    Slave,
    /// A display board.
    Viewer,
}

impl Role {
    /// Whether operator mutations must be refused under this role.
    pub fn operations_disabled(self) -> bool {
        matches!(self, Role::Slave | Role::Viewer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Unassigned => "unassigned",
            Role::Master => "master",
            Role::Slave => "slave",
            Role::Viewer => "viewer",
        };
        f.write_str(name)
    }
}

// ── State payload ───────────────────────────────────────────────────

/// A received state payload. Every field is optional; only present fields
/// are merged.
///
/// Numbers are kept signed so out-of-domain values can be clamped on merge
/// instead of rejecting the whole message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_top: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_bottom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_inning: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_base: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_base: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub third_base: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ball_cnt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike_cnt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_cnt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_top: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_bottom: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inning: Option<i64>,
}

impl StatePatch {
    /// Extract the payload from a state envelope body.
    ///
    /// Accepts `boardData`, then `data`, then the flat body itself.
    fn from_body(mut body: Map<String, Value>) -> Result<Self> {
        let payload = match body.remove("boardData") {
            Some(Value::Object(inner)) => inner,
            _ => match body.remove("data") {
                Some(Value::Object(inner)) => inner,
                _ => body,
            },
        };
        Ok(serde_json::from_value(Value::Object(payload))?)
    }

    /// Whether no field is present.
    pub fn is_empty(&self) -> bool {
        *self == StatePatch::default()
    }
}

impl From<&GameState> for StatePatch {
    fn from(state: &GameState) -> Self {
        Self {
            game_title: Some(state.title.clone()),
            team_top: Some(state.team_top.clone()),
            team_bottom: Some(state.team_bottom.clone()),
            game_inning: Some(i64::from(state.inning)),
            top: Some(state.top),
            first_base: Some(state.bases.first),
            second_base: Some(state.bases.second),
            third_base: Some(state.bases.third),
            ball_cnt: Some(i64::from(state.balls)),
            strike_cnt: Some(i64::from(state.strikes)),
            out_cnt: Some(i64::from(state.outs)),
            score_top: Some(i64::from(state.score_top)),
            score_bottom: Some(i64::from(state.score_bottom)),
            last_inning: Some(i64::from(state.last_inning)),
        }
    }
}

// ── Payload structs ─────────────────────────────────────────────────

/// Body of `role_assignment`, sent once right after the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: Role,
    #[serde(rename = "clientId")]
    pub client_id: ClientId,
    #[serde(rename = "masterClientId", default)]
    pub master_client_id: Option<ClientId>,
    #[serde(
        rename = "masterToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub master_token: Option<MasterToken>,
}

/// Body of `role_changed`, sent on failover or release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanged {
    #[serde(rename = "newRole")]
    pub new_role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    #[serde(
        rename = "masterClientId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub master_client_id: Option<ClientId>,
    #[serde(
        rename = "masterToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub master_token: Option<MasterToken>,
    /// Explicit instruction to forget any stored token.
    #[serde(rename = "clearToken", default, skip_serializing_if = "Option::is_none")]
    pub clear_token: Option<bool>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Envelopes sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on every connection.
    Handshake {
        #[serde(rename = "clientType")]
        client_type: ClientType,
        /// Reclaim credential from an earlier mastership, if any.
        #[serde(
            rename = "masterToken",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        master_token: Option<MasterToken>,
    },
    /// Full snapshot from the master.
    GameStateUpdate {
        #[serde(rename = "boardData")]
        board_data: GameState,
    },
    /// Give up mastership.
    ReleaseMaster,
}

/// Envelopes received from the relay.
///
/// Deserialization goes through [`ServerMessage::parse`] rules: a missing
/// `type` is the legacy state variant; an unknown `type` is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoleAssignment(RoleAssignment),
    RoleChanged(RoleChanged),
    GameState(StatePatch),
}

impl ServerMessage {
    /// Parse one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::Serialization`](crate::ScoreboardError::Serialization)
    /// for invalid JSON, non-object envelopes, unknown `type` values, and
    /// mistyped fields.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Resolve an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut body) = value else {
            return Err(serde_json::Error::custom("envelope must be a JSON object").into());
        };
        match body.remove("type") {
            None => Ok(ServerMessage::GameState(StatePatch::from_body(body)?)),
            Some(Value::String(kind)) => match kind.as_str() {
                "role_assignment" => Ok(ServerMessage::RoleAssignment(serde_json::from_value(
                    Value::Object(body),
                )?)),
                "role_changed" => Ok(ServerMessage::RoleChanged(serde_json::from_value(
                    Value::Object(body),
                )?)),
                "game_state" => Ok(ServerMessage::GameState(StatePatch::from_body(body)?)),
                other => Err(
                    serde_json::Error::custom(format!("unknown message type `{other}`")).into(),
                ),
            },
            Some(other) => Err(serde_json::Error::custom(format!(
                "`type` must be a string, got {other}"
            ))
            .into()),
        }
    }
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ServerMessage::from_value(value).map_err(D::Error::custom)
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

    #[test]
    fn handshake_omits_absent_token() {
        let msg = ClientMessage::Handshake {
            client_type: ClientType::Board,
            master_token: None,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"handshake","clientType":"board"}"#
        );
    }

    #[test]
    fn release_master_is_bare_type() {
        let json = serde_json::to_string(&ClientMessage::ReleaseMaster).unwrap();
        assert_eq!(json, r#"{"type":"release_master"}"#);
    }

    #[test]
    fn untyped_envelope_is_legacy_state() {
        let msg = ServerMessage::parse(r#"{"out_cnt":0,"top":false}"#).unwrap();
        let ServerMessage::GameState(patch) = msg else {
            panic!("expected state, got {msg:?}");
        };
        assert_eq!(patch.out_cnt, Some(0));
        assert_eq!(patch.top, Some(false));
        assert_eq!(patch.ball_cnt, None);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(ServerMessage::parse(r#"{"type":"confetti"}"#).is_err());
        assert!(ServerMessage::parse(r#"{"type":7}"#).is_err());
        assert!(ServerMessage::parse("[1,2]").is_err());
    }

    #[test]
    fn serialized_state_message_parses_back() {
        let patch = StatePatch {
            ball_cnt: Some(2),
            ..StatePatch::default()
        };
        let json = serde_json::to_string(&ServerMessage::GameState(patch.clone())).unwrap();
        assert_eq!(ServerMessage::parse(&json).unwrap(), ServerMessage::GameState(patch));
    }

    #[test]
    fn operations_disabled_for_read_only_roles() {
        assert!(!Role::Unassigned.operations_disabled());
        assert!(!Role::Master.operations_disabled());
        assert!(Role::Slave.operations_disabled());
        assert!(Role::Viewer.operations_disabled());
    }
}
