#![no_main]

use libfuzzer_sys::fuzz_target;
use scoreboard_sync::protocol::ServerMessage;
use scoreboard_sync::{GameState, GameStateModel};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(message) = ServerMessage::parse(text) else {
        return;
    };

    // Any state payload the relay can send must merge into a valid board.
    if let ServerMessage::GameState(patch) = message {
        let mut model = GameStateModel::new(GameState::default());
        model.merge(&patch);
        let state = model.state();
        assert!(state.balls <= scoreboard_sync::game::MAX_BALLS);
        assert!(state.strikes <= scoreboard_sync::game::MAX_STRIKES);
        assert!(state.outs <= scoreboard_sync::game::MAX_OUTS);
        assert!(state.last_inning >= 1);
        assert!(state.inning <= state.final_inning());
    }
});
