//! # Operator Panel Example
//!
//! A terminal operator panel for a running scoreboard relay:
//!
//! 1. Load the optional setup file (title, team names, last inning)
//! 2. Connect over WebSocket and negotiate a role
//! 3. Turn typed commands into operations while this panel is master
//! 4. Print every scoreboard change, local or remote
//!
//! ## Running
//!
//! ```sh
//! # Against the embedded relay on 127.0.0.1:8080:
//! cargo run --example operator_panel
//!
//! # Against a hosted relay, with a setup file:
//! SCOREBOARD_HOST=scores.local:8080 SCOREBOARD_INIT=init_data.json \
//!     cargo run --example operator_panel
//! ```
//!
//! Commands: `b`/`B` ball up/down, `s`/`S` strike, `o`/`O` out,
//! `t`/`T` top score, `u`/`U` bottom score, `1` `2` `3` toggle base,
//! `n`/`p` next/previous half inning, `c` reset count, `x` change offense,
//! `new`, `end`, `release`, `restart`, `q`.

use scoreboard_sync::{
    Base, ClientType, InitData, Operation, PageContext, ScoreboardClient, ScoreboardConfig,
    ScoreboardEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Parsed panel input.
enum Input {
    Op(Operation),
    Release,
    Restart,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let op = match line.trim() {
        "b" => Operation::BallUp,
        "B" => Operation::BallDown,
        "s" => Operation::StrikeUp,
        "S" => Operation::StrikeDown,
        "o" => Operation::OutUp,
        "O" => Operation::OutDown,
        "t" => Operation::ScoreTopUp,
        "T" => Operation::ScoreTopDown,
        "u" => Operation::ScoreBottomUp,
        "U" => Operation::ScoreBottomDown,
        "1" => Operation::ToggleBase(Base::First),
        "2" => Operation::ToggleBase(Base::Second),
        "3" => Operation::ToggleBase(Base::Third),
        "n" => Operation::AdvanceHalfInning,
        "p" => Operation::RetreatHalfInning,
        "c" => Operation::ResetCount,
        "x" => Operation::ChangeOffense,
        "new" => Operation::NewGame,
        "end" => Operation::EndGame,
        "release" => return Some(Input::Release),
        "restart" => return Some(Input::Restart),
        "q" => return Some(Input::Quit),
        _ => return None,
    };
    Some(Input::Op(op))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let page = match std::env::var("SCOREBOARD_HOST") {
        Ok(host) => PageContext::hosted(host, std::env::var("SCOREBOARD_TLS").is_ok()),
        Err(_) => PageContext::embedded(),
    };
    let mut config = ScoreboardConfig::new(ClientType::Operation).with_page(page);

    if let Ok(path) = std::env::var("SCOREBOARD_INIT") {
        let init = InitData::from_path(&path)?;
        tracing::info!("loaded {path}: {} ({})", init.game_title, init.display_color());
        config = config.with_initial_state(init.to_game_state());
    }
    tracing::info!("relay: {}", config.relay_url());

    let (mut client, mut events) = ScoreboardClient::connect_websocket(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ScoreboardEvent::Connected => tracing::info!("connected, negotiating role…"),
                    ScoreboardEvent::RoleAssigned { role, client_id, .. } => {
                        tracing::info!("client {client_id} is {role}");
                    }
                    ScoreboardEvent::RoleChanged { role, reason } => {
                        tracing::info!("now {role} ({})", reason.as_deref().unwrap_or("no reason"));
                    }
                    ScoreboardEvent::StateChanged { state, origin } => {
                        let bases: String = [Base::First, Base::Second, Base::Third]
                            .iter()
                            .map(|b| if state.bases.is_occupied(*b) { '◆' } else { '◇' })
                            .collect();
                        println!(
                            "[{origin:?}] {} | {} {} - {} {} | B{} S{} O{} | {bases}",
                            state.phase(),
                            state.team_top,
                            state.score_top,
                            state.score_bottom,
                            state.team_bottom,
                            state.balls,
                            state.strikes,
                            state.outs,
                        );
                    }
                    ScoreboardEvent::OperationRefused { operation } => {
                        tracing::warn!("{operation:?} refused: this panel is read-only");
                    }
                    ScoreboardEvent::Reconnecting { attempt, delay } => {
                        tracing::warn!("reconnect #{attempt} in {delay:?}");
                    }
                    ScoreboardEvent::ConnectionLost => {
                        tracing::error!("relay unreachable; type `restart` to try again");
                    }
                    ScoreboardEvent::Disconnected { reason } => {
                        tracing::info!("disconnected: {}", reason.as_deref().unwrap_or("clean"));
                        break;
                    }
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Some(Input::Op(op)) => client.apply(op)?,
                    Some(Input::Release) => client.release_master()?,
                    Some(Input::Restart) => client.restart()?,
                    Some(Input::Quit) => break,
                    None => tracing::warn!("unknown command: {line:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
