//! Slash commands sent through `chat_command`
//!
//! Replies go to the issuing player only, on the `server` channel. A name
//! change is announced to everyone.

use std::sync::LazyLock;

use regex::Regex;

use blockcast_protocol::{encode_line, ServerMessage};

use crate::broadcast::ConnectionId;
use crate::core::Result;
use crate::voxel::coords;
use super::handler::ServerState;

const SERVER_CHANNEL: &str = "server";

static NICK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("nickname pattern is valid"));

/// Parse and run one command line such as `/nick builder`
pub fn run(state: &ServerState, id: ConnectionId, command: &str) -> Result<()> {
    let args: Vec<&str> = command.split(' ').filter(|arg| !arg.is_empty()).collect();
    let Some(&name) = args.first() else {
        return reply(state, id, "invalid command: empty input");
    };

    match name {
        "/nick" => nick(state, id, &args),
        "/status" => reply(state, id, &status(state)),
        "/whereami" => whereami(state, id),
        _ => reply(state, id, "unknown command"),
    }
}

fn nick(state: &ServerState, id: ConnectionId, args: &[&str]) -> Result<()> {
    if args.len() != 2 {
        return reply(
            state,
            id,
            "invalid command: wrong number of args, expected '/nick <new_nickname>'",
        );
    }

    let new_nick = args[1];
    if !NICK_PATTERN.is_match(new_nick) {
        return reply(state, id, "invalid nickname: allowed characters are a-z A-Z 0-9 - _");
    }

    let Some(old_nick) = state.sessions.rename(id, new_nick) else {
        return Ok(());
    };
    log::info!("{} changed name from {} to {}", id, old_nick, new_nick);

    let notice = format!("*** {} changed name to {}", old_nick, new_nick);
    let line = encode_line(&ServerMessage::notice(SERVER_CHANNEL, notice))?;
    state.tracker.publish(line.into(), &[]);
    Ok(())
}

/// One-line summary of the server and who is online
pub fn status(state: &ServerState) -> String {
    let names = state.sessions.names();
    let mut s = format!(
        "-- Server v{}; {} players {{{}}}",
        env!("CARGO_PKG_VERSION"),
        names.len(),
        names.join(", ")
    );
    if !state.config.motd.is_empty() {
        s.push('\n');
        s.push_str(&state.config.motd);
    }
    s
}

fn whereami(state: &ServerState, id: ConnectionId) -> Result<()> {
    let Some(entity) = state.sessions.entity(id) else {
        return Ok(());
    };
    let chunk = coords::to_chunk_coord(entity.pos.floor().as_ivec3());
    let message = format!(
        "You are at ({:.1}, {:.1}, {:.1}) in mapblock ({}, {}, {})",
        entity.pos.x, entity.pos.y, entity.pos.z, chunk.x, chunk.y, chunk.z
    );
    reply(state, id, &message)
}

fn reply(state: &ServerState, id: ConnectionId, message: &str) -> Result<()> {
    let line = encode_line(&ServerMessage::private_notice(SERVER_CHANNEL, message))?;
    state.sessions.send_direct(id, line.into());
    Ok(())
}
