//! Client-facing network layer

pub mod commands;
pub mod handler;
pub mod server;

pub use handler::{BroadcastSink, ServerState};
pub use server::GameServer;
