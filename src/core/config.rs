//! Server configuration

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{Error, Result};

/// Runtime configuration for the server.
///
/// Every field has a default, so a config file only needs the keys it
/// wants to change.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    pub bind_addr: String,
    /// How long an outbound duty waits for a pending message before
    /// reconsidering (milliseconds)
    pub idle_poll_ms: u64,
    /// Entity snapshot period (milliseconds)
    pub entity_sync_ms: u64,
    /// Whether the editing client also receives the chunk broadcast it caused
    pub echo_edits_to_origin: bool,
    /// Pending-message count above which the tracker logs a warning
    pub pending_warn_threshold: usize,
    /// Longest accepted inbound line, in bytes, not counting the line terminator
    pub max_line_bytes: usize,
    /// How many chunks away from a player's own chunk it may request, per
    /// axis. `None` disables the check.
    pub view_distance: Option<u32>,
    /// How many nodes away from a player's position it may edit, per axis.
    /// `None` disables the check.
    pub reach_distance: Option<u32>,
    /// Appended to the `/status` reply when non-empty
    pub motd: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", blockcast_protocol::DEFAULT_PORT),
            idle_poll_ms: 100,
            entity_sync_ms: 200,
            echo_edits_to_origin: true,
            pending_warn_threshold: 1024,
            max_line_bytes: 4 * 1024 * 1024,
            view_distance: Some(8),
            reach_distance: Some(16),
            motd: String::new(),
        }
    }
}

impl ServerConfig {
    /// Load a config from a JSON file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse a config from JSON text and validate it
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ServerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(Error::Config("bind_addr is empty".into()));
        }
        if self.idle_poll_ms == 0 {
            return Err(Error::Config("idle_poll_ms must be non-zero".into()));
        }
        if self.entity_sync_ms == 0 {
            return Err(Error::Config("entity_sync_ms must be non-zero".into()));
        }
        if self.max_line_bytes == 0 {
            return Err(Error::Config("max_line_bytes must be non-zero".into()));
        }
        Ok(())
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn entity_sync_period(&self) -> Duration {
        Duration::from_millis(self.entity_sync_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.idle_poll(), Duration::from_millis(100));
        assert_eq!(config.entity_sync_period(), Duration::from_millis(200));
        assert!(config.echo_edits_to_origin);
        assert_eq!(config.view_distance, Some(8));
        assert_eq!(config.reach_distance, Some(16));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServerConfig::from_json(r#"{"bind_addr":"127.0.0.1:9000","entity_sync_ms":50}"#).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.entity_sync_ms, 50);
        assert_eq!(config.idle_poll_ms, 100);
    }

    #[test]
    fn test_null_distance_disables_guard() {
        let config = ServerConfig::from_json(r#"{"reach_distance":null,"motd":"hello"}"#).unwrap();
        assert_eq!(config.reach_distance, None);
        assert_eq!(config.view_distance, Some(8));
        assert_eq!(config.motd, "hello");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ServerConfig::from_json(r#"{"idle_poll_ms":0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_json_rejected() {
        let err = ServerConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
