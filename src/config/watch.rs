use super::BackoffPolicy;
use crate::constants::DEFAULT_KEY;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Watched prefix, any key starting with these bytes matches
    /// Default: "test"
    pub key: String,

    /// Ask the store for periodic progress notifications so the resume
    /// revision keeps moving while the prefix is idle
    /// Default: true
    pub progress_notify: bool,

    /// Delay between resubscribe attempts. Restarts never give up, so
    /// `max_retries` is ignored.
    pub restart_backoff: BackoffPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            progress_notify: true,
            restart_backoff: BackoffPolicy {
                max_retries: 0,
                timeout_ms: 5000,
                base_delay_ms: 100,
                max_delay_ms: 5000,
            },
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(Error::InvalidConfig("watch.key cannot be empty".into()));
        }
        self.restart_backoff.validate("watch.restart_backoff")
    }
}
