//! Blockcast - A multiplayer voxel chunk server

pub mod core;
pub mod voxel;
pub mod broadcast;
pub mod session;
pub mod net;
