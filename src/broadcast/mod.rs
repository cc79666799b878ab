//! Reliable fan-out of world and chat updates to every connection

pub mod tracker;

pub use tracker::{BroadcastTracker, ConnectionId, Delivery};
