//! Error types for the blockcast server

use thiserror::Error;

/// Main error type for the server
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client sent something that parses but violates the protocol
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}
