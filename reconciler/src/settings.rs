use std::time::Duration;

use crate::defs::{DEFAULT_ADDON_NAME, DEFAULT_IMAGE};

/// Knobs of the reconciliation engine that do not come from hub objects.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub addon_name: String,
    pub image: String,
    /// Upper bound on waiting for a deleted bundle to disappear.
    pub teardown_timeout: Duration,
    pub teardown_poll_interval: Duration,
    pub conflict_retries: u32,
    pub conflict_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            addon_name: DEFAULT_ADDON_NAME.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            teardown_timeout: Duration::from_secs(90),
            teardown_poll_interval: Duration::from_secs(1),
            conflict_retries: 5,
            conflict_backoff: Duration::from_millis(100),
        }
    }
}

impl EngineSettings {
    /// Backoff before the given conflict retry, doubling each attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.conflict_backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}
