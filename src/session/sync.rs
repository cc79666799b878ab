//! Periodic entity snapshot loop
//!
//! Snapshots bypass the broadcast queue: each tick overwrites the previous
//! one, so a slow reader only ever sees the latest positions.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::registry::SessionRegistry;

/// Handle to the running sync loop; the loop stops when this is dropped
pub struct EntitySync {
    handle: tokio::task::JoinHandle<()>,
}

impl EntitySync {
    /// Start the loop on the current tokio runtime
    pub fn start(registry: Arc<SessionRegistry>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.snapshot_round() {
                    log::error!("Entity snapshot failed: {}", e);
                }
            }
        });
        log::debug!("Entity sync running every {:?}", period);

        Self { handle }
    }
}

impl Drop for EntitySync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
