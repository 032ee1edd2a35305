//! Authoritative scoreboard value and baseball transition rules.
//!
//! [`GameState`] is the plain value mirrored across every client. Its methods
//! are the transition algorithms: pure, synchronous and clamped, so no input
//! can push a bounded field outside its domain.
//!
//! [`GameStateModel`] owns the live value for one client and calls a
//! [`StateObserver`] after every operation that actually changed it. This is
//! the explicit post-mutation hook the sync layer hangs off.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::StatePatch;

/// Highest ball count before a walk.
pub const MAX_BALLS: u8 = 3;

/// Highest strike count before a strikeout.
pub const MAX_STRIKES: u8 = 2;

/// Highest out count before the side is retired.
pub const MAX_OUTS: u8 = 2;

/// Number of regulation innings when nothing else is configured.
pub const DEFAULT_LAST_INNING: u32 = 9;

// ── Value types ─────────────────────────────────────────────────────

/// One of the three bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    First,
    Second,
    Third,
}

/// Runner occupancy of the three bases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bases {
    #[serde(rename = "first_base")]
    pub first: bool,
    #[serde(rename = "second_base")]
    pub second: bool,
    #[serde(rename = "third_base")]
    pub third: bool,
}

impl Bases {
    fn slot_mut(&mut self, base: Base) -> &mut bool {
        match base {
            Base::First => &mut self.first,
            Base::Second => &mut self.second,
            Base::Third => &mut self.third,
        }
    }

    /// Whether a runner is on `base`.
    pub fn is_occupied(&self, base: Base) -> bool {
        match base {
            Base::First => self.first,
            Base::Second => self.second,
            Base::Third => self.third,
        }
    }
}

/// Which team is batting within an inning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Top,
    Bottom,
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Half::Top => f.write_str("Top"),
            Half::Bottom => f.write_str("Bottom"),
        }
    }
}

/// Read-only projection of `inning` used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// `inning < 1`.
    NotStarted,
    /// `1 <= inning <= last_inning`.
    InProgress { inning: u32, half: Half },
    /// `inning > last_inning`.
    Finished,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GamePhase::NotStarted => f.write_str("Pre-game"),
            GamePhase::InProgress { inning, half } => write!(f, "{half} {inning}"),
            GamePhase::Finished => f.write_str("Final"),
        }
    }
}

/// The scoreboard value shared by every client.
///
/// Field names on the wire follow the relay's snapshot format
/// (`game_inning`, `ball_cnt`, `first_base`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(rename = "game_title")]
    pub title: String,
    pub team_top: String,
    pub team_bottom: String,
    /// `0` = not started, `1..=last_inning` = in progress, `last_inning + 1` = finished.
    #[serde(rename = "game_inning")]
    pub inning: u32,
    /// `true` while the top team is batting.
    pub top: bool,
    #[serde(flatten)]
    pub bases: Bases,
    #[serde(rename = "ball_cnt")]
    pub balls: u8,
    #[serde(rename = "strike_cnt")]
    pub strikes: u8,
    #[serde(rename = "out_cnt")]
    pub outs: u8,
    pub score_top: u32,
    pub score_bottom: u32,
    pub last_inning: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            title: String::new(),
            team_top: String::new(),
            team_bottom: String::new(),
            inning: 0,
            top: true,
            bases: Bases::default(),
            balls: 0,
            strikes: 0,
            outs: 0,
            score_top: 0,
            score_bottom: 0,
            last_inning: DEFAULT_LAST_INNING,
        }
    }
}

impl GameState {
    /// Inning value that marks a finished game.
    pub fn final_inning(&self) -> u32 {
        self.last_inning.saturating_add(1)
    }

    /// Current half as an enum.
    pub fn half(&self) -> Half {
        if self.top {
            Half::Top
        } else {
            Half::Bottom
        }
    }

    /// Map `inning` onto a display phase.
    pub fn phase(&self) -> GamePhase {
        if self.inning < 1 {
            GamePhase::NotStarted
        } else if self.inning > self.last_inning {
            GamePhase::Finished
        } else {
            GamePhase::InProgress {
                inning: self.inning,
                half: self.half(),
            }
        }
    }

    // ── Count ──

    pub fn ball_up(&mut self) {
        if self.balls < MAX_BALLS {
            self.balls += 1;
        }
    }

    pub fn ball_down(&mut self) {
        self.balls = self.balls.saturating_sub(1);
    }

    pub fn strike_up(&mut self) {
        if self.strikes < MAX_STRIKES {
            self.strikes += 1;
        }
    }

    pub fn strike_down(&mut self) {
        self.strikes = self.strikes.saturating_sub(1);
    }

    pub fn out_up(&mut self) {
        if self.outs < MAX_OUTS {
            self.outs += 1;
        }
    }

    pub fn out_down(&mut self) {
        self.outs = self.outs.saturating_sub(1);
    }

    // ── Score ──

    pub fn score_top_up(&mut self) {
        self.score_top = self.score_top.saturating_add(1);
    }

    pub fn score_top_down(&mut self) {
        self.score_top = self.score_top.saturating_sub(1);
    }

    pub fn score_bottom_up(&mut self) {
        self.score_bottom = self.score_bottom.saturating_add(1);
    }

    pub fn score_bottom_down(&mut self) {
        self.score_bottom = self.score_bottom.saturating_sub(1);
    }

    // ── Bases ──

    pub fn toggle_base(&mut self, base: Base) {
        let slot = self.bases.slot_mut(base);
        *slot = !*slot;
    }

    pub fn set_base(&mut self, base: Base, occupied: bool) {
        *self.bases.slot_mut(base) = occupied;
    }

    // ── Resets ──

    /// Zero balls, strikes and outs.
    pub fn reset_count(&mut self) {
        self.balls = 0;
        self.strikes = 0;
        self.outs = 0;
    }

    /// Clear the bases and the count ("new half").
    pub fn reset_bases_and_counts(&mut self) {
        self.bases = Bases::default();
        self.reset_count();
    }

    // ── Inning progression ──

    /// Swap the batting team without moving the inning.
    pub fn change_offense(&mut self) {
        self.top = !self.top;
        self.reset_bases_and_counts();
    }

    /// Step forward one half inning. No-op once the game is finished.
    pub fn advance_half_inning(&mut self) {
        if self.inning > self.last_inning {
            return;
        }
        if self.top {
            self.top = false;
        } else {
            self.inning += 1;
            self.top = true;
        }
        self.reset_bases_and_counts();
    }

    /// Step back one half inning. No-op before the first inning.
    ///
    /// Landing on inning 0 also wipes both scores; the forward path has no
    /// matching reset.
    pub fn retreat_half_inning(&mut self) {
        if self.inning < 1 {
            return;
        }
        if self.top {
            self.inning -= 1;
            self.top = false;
        } else {
            self.top = true;
        }
        self.reset_bases_and_counts();
        if self.inning == 0 {
            self.score_top = 0;
            self.score_bottom = 0;
        }
    }

    /// Whole-inning step forward, clamped at the finished marker.
    pub fn advance_inning(&mut self) {
        self.inning = self.inning.saturating_add(1).min(self.final_inning());
        self.reset_bases_and_counts();
    }

    /// Whole-inning step back, clamped at 0.
    pub fn retreat_inning(&mut self) {
        self.inning = self.inning.saturating_sub(1);
        self.reset_bases_and_counts();
    }

    pub fn new_game(&mut self) {
        self.inning = 0;
        self.top = true;
        self.score_top = 0;
        self.score_bottom = 0;
        self.reset_bases_and_counts();
    }

    pub fn end_game(&mut self) {
        self.inning = self.final_inning();
        self.reset_bases_and_counts();
    }

    // ── Remote merge ──

    /// Copy every field present in `patch`, clamping numbers into their domains.
    pub fn merge(&mut self, patch: &StatePatch) {
        if let Some(title) = &patch.game_title {
            self.title.clone_from(title);
        }
        if let Some(team) = &patch.team_top {
            self.team_top.clone_from(team);
        }
        if let Some(team) = &patch.team_bottom {
            self.team_bottom.clone_from(team);
        }
        if let Some(last) = patch.last_inning {
            self.last_inning = clamp_u32(last, 1, u32::MAX - 1);
        }
        if let Some(inning) = patch.game_inning {
            self.inning = clamp_u32(inning, 0, u32::MAX);
        }
        self.inning = self.inning.min(self.final_inning());
        if let Some(top) = patch.top {
            self.top = top;
        }
        if let Some(first) = patch.first_base {
            self.bases.first = first;
        }
        if let Some(second) = patch.second_base {
            self.bases.second = second;
        }
        if let Some(third) = patch.third_base {
            self.bases.third = third;
        }
        if let Some(balls) = patch.ball_cnt {
            self.balls = clamp_count(balls, MAX_BALLS);
        }
        if let Some(strikes) = patch.strike_cnt {
            self.strikes = clamp_count(strikes, MAX_STRIKES);
        }
        if let Some(outs) = patch.out_cnt {
            self.outs = clamp_count(outs, MAX_OUTS);
        }
        if let Some(score) = patch.score_top {
            self.score_top = clamp_u32(score, 0, u32::MAX);
        }
        if let Some(score) = patch.score_bottom {
            self.score_bottom = clamp_u32(score, 0, u32::MAX);
        }
    }
}

fn clamp_count(value: i64, max: u8) -> u8 {
    u8::try_from(value.clamp(0, i64::from(max))).unwrap_or(max)
}

fn clamp_u32(value: i64, min: u32, max: u32) -> u32 {
    u32::try_from(value.clamp(i64::from(min), i64::from(max))).unwrap_or(max)
}

// ── Operations ──────────────────────────────────────────────────────

/// Every mutation the operator surface can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    BallUp,
    BallDown,
    StrikeUp,
    StrikeDown,
    OutUp,
    OutDown,
    ScoreTopUp,
    ScoreTopDown,
    ScoreBottomUp,
    ScoreBottomDown,
    ToggleBase(Base),
    SetBase(Base, bool),
    ResetCount,
    ResetBasesAndCounts,
    ChangeOffense,
    AdvanceHalfInning,
    RetreatHalfInning,
    AdvanceInning,
    RetreatInning,
    /// Confirmation for a game in progress is the caller's concern.
    NewGame,
    EndGame,
    SetTitle(String),
    SetTeamTop(String),
    SetTeamBottom(String),
}

impl Operation {
    /// Run this operation against `state`.
    pub fn apply_to(&self, state: &mut GameState) {
        match self {
            Operation::BallUp => state.ball_up(),
            Operation::BallDown => state.ball_down(),
            Operation::StrikeUp => state.strike_up(),
            Operation::StrikeDown => state.strike_down(),
            Operation::OutUp => state.out_up(),
            Operation::OutDown => state.out_down(),
            Operation::ScoreTopUp => state.score_top_up(),
            Operation::ScoreTopDown => state.score_top_down(),
            Operation::ScoreBottomUp => state.score_bottom_up(),
            Operation::ScoreBottomDown => state.score_bottom_down(),
            Operation::ToggleBase(base) => state.toggle_base(*base),
            Operation::SetBase(base, occupied) => state.set_base(*base, *occupied),
            Operation::ResetCount => state.reset_count(),
            Operation::ResetBasesAndCounts => state.reset_bases_and_counts(),
            Operation::ChangeOffense => state.change_offense(),
            Operation::AdvanceHalfInning => state.advance_half_inning(),
            Operation::RetreatHalfInning => state.retreat_half_inning(),
            Operation::AdvanceInning => state.advance_inning(),
            Operation::RetreatInning => state.retreat_inning(),
            Operation::NewGame => state.new_game(),
            Operation::EndGame => state.end_game(),
            Operation::SetTitle(title) => state.title.clone_from(title),
            Operation::SetTeamTop(team) => state.team_top.clone_from(team),
            Operation::SetTeamBottom(team) => state.team_bottom.clone_from(team),
        }
    }
}

// ── Model ───────────────────────────────────────────────────────────

/// Post-mutation hook run by [`GameStateModel`].
pub trait StateObserver {
    /// Called synchronously after an operation changed the state.
    fn state_changed(&mut self, state: &GameState);
}

impl StateObserver for () {
    fn state_changed(&mut self, _state: &GameState) {}
}

/// The single live [`GameState`] of a client plus its change hook.
#[derive(Debug)]
pub struct GameStateModel<O = ()> {
    state: GameState,
    observer: O,
}

impl GameStateModel<()> {
    /// A model with no observer.
    pub fn new(state: GameState) -> Self {
        Self::with_observer(state, ())
    }
}

impl<O: StateObserver> GameStateModel<O> {
    pub fn with_observer(state: GameState, observer: O) -> Self {
        Self { state, observer }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Apply an operator operation. Returns `true` if the state changed.
    pub fn apply(&mut self, op: &Operation) -> bool {
        self.mutate(|state| op.apply_to(state))
    }

    /// Merge a remote patch. Returns `true` if the state changed.
    pub fn merge(&mut self, patch: &StatePatch) -> bool {
        self.mutate(|state| state.merge(patch))
    }

    fn mutate(&mut self, f: impl FnOnce(&mut GameState)) -> bool {
        let before = self.state.clone();
        f(&mut self.state);
        let changed = self.state != before;
        if changed {
            self.observer.state_changed(&self.state);
        }
        changed
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

    fn at(inning: u32, top: bool) -> GameState {
        GameState {
            inning,
            top,
            ..GameState::default()
        }
    }

    #[test]
    fn counts_are_clamped() {
        let mut s = GameState::default();
        for _ in 0..10 {
            s.ball_up();
            s.strike_up();
            s.out_up();
        }
        assert_eq!((s.balls, s.strikes, s.outs), (3, 2, 2));

        for _ in 0..10 {
            s.ball_down();
            s.strike_down();
            s.out_down();
        }
        assert_eq!((s.balls, s.strikes, s.outs), (0, 0, 0));
    }

    #[test]
    fn scores_floor_at_zero_and_grow_unbounded() {
        let mut s = GameState::default();
        s.score_top_down();
        s.score_bottom_down();
        assert_eq!((s.score_top, s.score_bottom), (0, 0));

        for _ in 0..25 {
            s.score_top_up();
        }
        s.score_bottom_up();
        assert_eq!((s.score_top, s.score_bottom), (25, 1));
    }

    #[test]
    fn advance_half_inning_from_top_and_bottom() {
        let mut s = at(3, false);
        s.advance_half_inning();
        assert_eq!((s.inning, s.top), (4, true));

        let mut s = at(3, true);
        s.advance_half_inning();
        assert_eq!((s.inning, s.top), (3, false));
    }

    #[test]
    fn advance_half_inning_resets_bases_and_counts() {
        let mut s = at(2, true);
        s.balls = 2;
        s.outs = 1;
        s.bases.second = true;
        s.advance_half_inning();
        assert_eq!(s.bases, Bases::default());
        assert_eq!((s.balls, s.strikes, s.outs), (0, 0, 0));
    }

    #[test]
    fn advance_half_inning_is_inert_once_finished() {
        let mut s = at(10, true);
        s.balls = 2;
        s.advance_half_inning();
        assert_eq!((s.inning, s.top, s.balls), (10, true, 2));
    }

    #[test]
    fn last_bottom_half_advances_to_finished() {
        let mut s = at(9, false);
        s.advance_half_inning();
        assert_eq!(s.phase(), GamePhase::Finished);
    }

    #[test]
    fn retreat_half_inning_into_pre_game_wipes_scores() {
        let mut s = at(1, false);
        s.score_top = 4;
        s.score_bottom = 2;

        s.retreat_half_inning();
        assert_eq!((s.inning, s.top), (1, true));
        assert_eq!((s.score_top, s.score_bottom), (4, 2));

        s.retreat_half_inning();
        assert_eq!((s.inning, s.top), (0, false));
        assert_eq!((s.score_top, s.score_bottom), (0, 0));

        // Further retreats do nothing.
        s.score_top = 1;
        s.retreat_half_inning();
        assert_eq!((s.inning, s.top, s.score_top), (0, false, 1));
    }

    #[test]
    fn advance_half_inning_does_not_touch_scores() {
        let mut s = at(0, false);
        s.score_top = 3;
        s.advance_half_inning();
        assert_eq!((s.inning, s.top, s.score_top), (1, true, 3));
    }

    #[test]
    fn whole_inning_steps_are_clamped() {
        let mut s = at(9, true);
        s.advance_inning();
        assert_eq!(s.inning, 10);
        s.advance_inning();
        assert_eq!(s.inning, 10);

        let mut s = at(0, true);
        s.outs = 2;
        s.retreat_inning();
        assert_eq!(s.inning, 0);
        assert_eq!(s.outs, 0);
    }

    #[test]
    fn change_offense_flips_half_and_clears() {
        let mut s = at(5, true);
        s.bases.first = true;
        s.strikes = 2;
        s.change_offense();
        assert!(!s.top);
        assert_eq!(s.inning, 5);
        assert!(!s.bases.first);
        assert_eq!(s.strikes, 0);
    }

    #[test]
    fn new_game_and_end_game() {
        let mut s = at(6, false);
        s.score_top = 3;
        s.balls = 1;
        s.end_game();
        assert_eq!(s.inning, 10);
        assert_eq!(s.balls, 0);
        assert_eq!(s.score_top, 3);

        s.new_game();
        assert_eq!((s.inning, s.top), (0, true));
        assert_eq!((s.score_top, s.score_bottom), (0, 0));
    }

    #[test]
    fn phase_projection() {
        assert_eq!(at(0, true).phase(), GamePhase::NotStarted);
        assert_eq!(
            at(4, false).phase(),
            GamePhase::InProgress {
                inning: 4,
                half: Half::Bottom
            }
        );
        assert_eq!(at(10, true).phase(), GamePhase::Finished);
        assert_eq!(at(4, false).phase().to_string(), "Bottom 4");
        assert_eq!(at(0, true).phase().to_string(), "Pre-game");
        assert_eq!(at(10, true).phase().to_string(), "Final");
    }

    #[test]
    fn bases_toggle_independently() {
        let mut s = GameState::default();
        s.toggle_base(Base::Second);
        assert!(s.bases.is_occupied(Base::Second));
        assert!(!s.bases.is_occupied(Base::First));
        s.set_base(Base::Third, true);
        s.toggle_base(Base::Second);
        assert_eq!(
            s.bases,
            Bases {
                first: false,
                second: false,
                third: true
            }
        );
    }

    #[test]
    fn merge_only_touches_present_fields() {
        let mut s = at(3, true);
        s.outs = 2;
        s.bases.first = true;
        s.title = "Final".into();

        let patch = StatePatch {
            out_cnt: Some(0),
            first_base: Some(false),
            ..StatePatch::default()
        };
        s.merge(&patch);

        assert_eq!(s.outs, 0);
        assert!(!s.bases.first);
        assert_eq!(s.inning, 3);
        assert_eq!(s.title, "Final");
    }

    #[test]
    fn merge_clamps_out_of_domain_values() {
        let mut s = GameState::default();
        let patch = StatePatch {
            ball_cnt: Some(7),
            strike_cnt: Some(-1),
            score_top: Some(-5),
            last_inning: Some(7),
            game_inning: Some(40),
            ..StatePatch::default()
        };
        s.merge(&patch);
        assert_eq!(s.balls, 3);
        assert_eq!(s.strikes, 0);
        assert_eq!(s.score_top, 0);
        assert_eq!(s.last_inning, 7);
        assert_eq!(s.inning, 8);
    }

    #[derive(Default)]
    struct Recorder(Vec<GameState>);

    impl StateObserver for Recorder {
        fn state_changed(&mut self, state: &GameState) {
            self.0.push(state.clone());
        }
    }

    #[test]
    fn model_notifies_only_on_change() {
        let mut model = GameStateModel::with_observer(GameState::default(), Recorder::default());

        assert!(model.apply(&Operation::BallUp));
        assert!(model.apply(&Operation::BallDown));
        assert_eq!(model.observer().0.len(), 2);

        // Already at zero: nothing changes, no notification.
        assert!(!model.apply(&Operation::BallDown));
        assert_eq!(model.observer().0.len(), 2);

        assert!(model.apply(&Operation::SetTitle("Spring Cup".into())));
        assert_eq!(model.observer().0.last().unwrap().title, "Spring Cup");
    }
}
