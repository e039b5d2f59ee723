use std::time::Duration;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (0 means unlimited retries)
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_retries == 0
    }

    pub(crate) fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig(format!("{name}.timeout_ms must be greater than 0")));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(format!("{name}.base_delay_ms must be greater than 0")));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "{name}.max_delay_ms ({}) must not be below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}

fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    3000
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    1000
}
