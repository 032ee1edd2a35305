//! Client configuration and the static scoreboard setup resource.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, ScoreboardError};
use crate::game::{GameState, DEFAULT_LAST_INNING};
use crate::protocol::ClientType;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Loopback relay address used inside the embedded desktop shell.
pub const EMBEDDED_RELAY_ADDR: &str = "127.0.0.1:8080";

/// Path of the relay's WebSocket endpoint.
pub const RELAY_PATH: &str = "/ws";

/// Background color used when the configured one is missing or invalid.
pub const DEFAULT_BACKGROUND_COLOR: &str = "#000000";

// ── PageContext ─────────────────────────────────────────────────────

/// Where the client runs, which decides the relay URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    /// The hosting page was served over a secure scheme.
    pub secure: bool,
    /// Host (and port) of the hosting page.
    pub host: String,
    /// Running inside the embedded desktop shell.
    pub embedded: bool,
}

impl PageContext {
    /// A regular page served from `host`.
    pub fn hosted(host: impl Into<String>, secure: bool) -> Self {
        Self {
            secure,
            host: host.into(),
            embedded: false,
        }
    }

    /// The embedded desktop shell, talking to the bundled local relay.
    pub fn embedded() -> Self {
        Self {
            secure: false,
            host: EMBEDDED_RELAY_ADDR.to_owned(),
            embedded: true,
        }
    }

    /// The relay URL for this context.
    ///
    /// ```
    /// use scoreboard_sync::config::PageContext;
    ///
    /// assert_eq!(PageContext::hosted("board.local:3000", true).relay_url(), "wss://board.local:3000/ws");
    /// assert_eq!(PageContext::embedded().relay_url(), "ws://127.0.0.1:8080/ws");
    /// ```
    pub fn relay_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let host = if self.embedded {
            EMBEDDED_RELAY_ADDR
        } else {
            self.host.as_str()
        };
        format!("{scheme}://{host}{RELAY_PATH}")
    }
}

impl Default for PageContext {
    fn default() -> Self {
        Self::embedded()
    }
}

// ── ReconnectPolicy ─────────────────────────────────────────────────

/// Exponential backoff settings for reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub cap_delay: Duration,
    /// After this many failed retries the connection is given up for good.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            cap_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempts, cap)`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.cap_delay, |delay| delay.min(self.cap_delay))
    }
}

// ── ScoreboardConfig ────────────────────────────────────────────────

/// Configuration for a [`ScoreboardClient`](crate::ScoreboardClient).
///
/// # Example
///
/// ```
/// use scoreboard_sync::config::{PageContext, ScoreboardConfig};
/// use scoreboard_sync::protocol::ClientType;
/// use std::time::Duration;
///
/// let config = ScoreboardConfig::new(ClientType::Operation)
///     .with_page(PageContext::hosted("scores.example", true))
///     .with_shutdown_timeout(Duration::from_secs(2));
/// assert_eq!(config.relay_url(), "wss://scores.example/ws");
/// ```
#[derive(Debug, Clone)]
pub struct ScoreboardConfig {
    /// What this client declares itself as in the handshake.
    pub client_type: ClientType,
    pub page: PageContext,
    pub reconnect: ReconnectPolicy,
    /// State the model starts from before the relay sends anything.
    pub initial_state: GameState,
    /// Capacity of the bounded event channel.
    ///
    /// Events are dropped with a warning when the consumer falls behind.
    /// `Disconnected` is always delivered. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time allowed for the session to close its connection on shutdown
    /// before the task is aborted.
    pub shutdown_timeout: Duration,
}

impl ScoreboardConfig {
    pub fn new(client_type: ClientType) -> Self {
        Self {
            client_type,
            page: PageContext::default(),
            reconnect: ReconnectPolicy::default(),
            initial_state: GameState::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_initial_state(mut self, state: GameState) -> Self {
        self.initial_state = state;
        self
    }

    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Defaults to **1 second**. Zero aborts the session immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn relay_url(&self) -> String {
        self.page.relay_url()
    }
}

// ── InitData ────────────────────────────────────────────────────────

/// The static setup resource (`init_data.json`).
///
/// Known keys are typed; everything else (dropdown options and similar UI
/// enumerations) is kept verbatim in `options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitData {
    #[serde(default)]
    pub game_title: String,
    #[serde(default)]
    pub team_top: String,
    #[serde(default)]
    pub team_bottom: String,
    #[serde(default = "default_last_inning")]
    pub last_inning: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

fn default_last_inning() -> u32 {
    DEFAULT_LAST_INNING
}

impl Default for InitData {
    fn default() -> Self {
        Self {
            game_title: String::new(),
            team_top: String::new(),
            team_bottom: String::new(),
            last_inning: DEFAULT_LAST_INNING,
            background_color: None,
            options: Map::new(),
        }
    }
}

impl InitData {
    /// Parse the resource from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::Serialization`] for malformed JSON and
    /// [`ScoreboardError::InvalidConfig`] when `last_inning` is zero.
    pub fn from_json(text: &str) -> Result<Self> {
        let data: InitData = serde_json::from_str(text)?;
        if data.last_inning == 0 {
            return Err(ScoreboardError::InvalidConfig(
                "last_inning must be positive".into(),
            ));
        }
        Ok(data)
    }

    /// Read and parse the resource from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreboardError::Io`] if the file cannot be read, or any
    /// error from [`from_json`](Self::from_json).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// A fresh pre-game state using these names and inning count.
    pub fn to_game_state(&self) -> GameState {
        GameState {
            title: self.game_title.clone(),
            team_top: self.team_top.clone(),
            team_bottom: self.team_bottom.clone(),
            last_inning: self.last_inning,
            ..GameState::default()
        }
    }

    /// Validated display background color, or the default.
    pub fn display_color(&self) -> String {
        display_color(self.background_color.as_deref())
    }
}

/// Validate a `#rgb` / `#rrggbb` color, case-insensitively.
///
/// Returns the lowercase six-digit form, or `None` if the input is not a
/// hex color.
///
/// ```
/// use scoreboard_sync::config::validate_hex_color;
///
/// assert_eq!(validate_hex_color("#abc").as_deref(), Some("#aabbcc"));
/// assert_eq!(validate_hex_color("#AABBCC").as_deref(), Some("#aabbcc"));
/// assert_eq!(validate_hex_color("#GGGGGG"), None);
/// ```
pub fn validate_hex_color(input: &str) -> Option<String> {
    let digits = input.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let digits = digits.to_ascii_lowercase();
    match digits.len() {
        3 => {
            let mut out = String::with_capacity(7);
            out.push('#');
            for c in digits.chars() {
                out.push(c);
                out.push(c);
            }
            Some(out)
        }
        6 => Some(format!("#{digits}")),
        _ => None,
    }
}

/// Resolve an optional untrusted color to something safe to render.
pub fn display_color(input: Option<&str>) -> String {
    match input {
        None => DEFAULT_BACKGROUND_COLOR.to_owned(),
        Some(raw) => validate_hex_color(raw).unwrap_or_else(|| {
            warn!(
                "invalid background color {raw:?}, using {DEFAULT_BACKGROUND_COLOR}"
            );
            DEFAULT_BACKGROUND_COLOR.to_owned()
        }),
    }
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

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..8)
            .map(|n| policy.delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn relay_url_follows_page_scheme() {
        assert_eq!(
            PageContext::hosted("10.0.0.5:8080", false).relay_url(),
            "ws://10.0.0.5:8080/ws"
        );
        let secure_embedded = PageContext {
            secure: true,
            host: "ignored".into(),
            embedded: true,
        };
        assert_eq!(secure_embedded.relay_url(), "wss://127.0.0.1:8080/ws");
    }

    #[test]
    fn config_defaults() {
        let config = ScoreboardConfig::new(ClientType::Board);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.relay_url(), "ws://127.0.0.1:8080/ws");
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = ScoreboardConfig::new(ClientType::Board).with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn hex_color_validation() {
        assert_eq!(validate_hex_color("#GGGGGG"), None);
        assert_eq!(validate_hex_color("#abc").as_deref(), Some("#aabbcc"));
        assert_eq!(validate_hex_color("#AABBCC").as_deref(), Some("#aabbcc"));
        assert_eq!(validate_hex_color("aabbcc"), None);
        assert_eq!(validate_hex_color("#abcd"), None);
        assert_eq!(validate_hex_color("#abc\" onload=\"x"), None);
        assert_eq!(display_color(Some("red")), DEFAULT_BACKGROUND_COLOR);
        assert_eq!(display_color(None), DEFAULT_BACKGROUND_COLOR);
        assert_eq!(display_color(Some("#0F0")), "#00ff00");
    }

    #[test]
    fn init_data_parses_and_keeps_options() {
        let data = InitData::from_json(
            r##"{
                "game_title": "Summer Cup",
                "team_top": "Yokohama",
                "team_bottom": "Shizuoka",
                "last_inning": 7,
                "background_color": "#123",
                "game_array": ["Round 1", "Final"]
            }"##,
        )
        .unwrap();
        assert_eq!(data.last_inning, 7);
        assert_eq!(data.display_color(), "#112233");
        assert!(data.options.contains_key("game_array"));

        let state = data.to_game_state();
        assert_eq!(state.title, "Summer Cup");
        assert_eq!(state.last_inning, 7);
        assert_eq!(state.inning, 0);
    }

    #[test]
    fn init_data_rejects_zero_innings() {
        let err = InitData::from_json(r#"{"last_inning": 0}"#).unwrap_err();
        assert!(matches!(err, ScoreboardError::InvalidConfig(_)));
    }

    #[test]
    fn default_init_data_plays_nine_innings() {
        let state = InitData::default().to_game_state();
        assert_eq!(state.last_inning, 9);

        let mut model = crate::game::GameStateModel::new(state);
        model.apply(&crate::game::Operation::AdvanceHalfInning);
        model.apply(&crate::game::Operation::AdvanceHalfInning);
        assert_eq!(model.state().inning, 1);
        assert_ne!(model.state().phase(), crate::game::GamePhase::Finished);
    }

    #[test]
    fn init_data_defaults_missing_fields() {
        let data = InitData::from_json("{}").unwrap();
        assert_eq!(data.last_inning, DEFAULT_LAST_INNING);
        assert!(data.background_color.is_none());
    }
}
