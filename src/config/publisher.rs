use std::time::Duration;

use super::BackoffPolicy;
use crate::constants::DEFAULT_KEY;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Write target, must equal the watched key
    /// Default: "test"
    pub key: String,

    /// Time between two writes
    /// Default: 5 seconds
    pub interval: Duration,

    /// Retry policy for a single write
    pub write_retry: BackoffPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            interval: Duration::from_secs(5),
            write_retry: BackoffPolicy {
                max_retries: 5,
                timeout_ms: 3000,
                base_delay_ms: 200,
                max_delay_ms: 2000,
            },
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(Error::InvalidConfig("publisher.key cannot be empty".into()));
        }
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig("publisher.interval must be greater than 0".into()));
        }
        if self.write_retry.is_unlimited() {
            return Err(Error::InvalidConfig(
                "publisher.write_retry.max_retries must be bounded".into(),
            ));
        }
        self.write_retry.validate("publisher.write_retry")
    }
}
