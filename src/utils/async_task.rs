use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;

/// Exponential delay generator: `base, 2*base, 4*base, ...` capped at the
/// policy's `max_delay_ms`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    next: Duration,
    attempts: usize,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            next: policy.base_delay(),
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next.min(self.policy.max_delay());
        self.next = delay.saturating_mul(2).min(self.policy.max_delay());
        self.attempts += 1;
        delay
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.next = self.policy.base_delay();
        self.attempts = 0;
    }
}

/// Runs `task` until it succeeds, each attempt bounded by the policy's
/// timeout, sleeping with exponential backoff in between.
///
/// `max_retries` counts attempts; 0 means retry forever. The last error is
/// returned once attempts are exhausted.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P, E>(
    mut task: F,
    policy: BackoffPolicy,
) -> std::result::Result<P, E>
where
    F: FnMut() -> T,
    T: Future<Output = std::result::Result<P, E>>,
    E: From<Elapsed> + Debug,
{
    let mut backoff = Backoff::new(policy);
    let mut attempts = 0;
    loop {
        attempts += 1;
        let e = match timeout(policy.timeout(), task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(error)) => {
                warn!("failed with error: {:?}", &error);
                error
            }
            Err(elapsed) => {
                warn!("task_with_timeout_and_exponential_backoff timeout: {:?}", &elapsed);
                E::from(elapsed)
            }
        };

        if !policy.is_unlimited() && attempts >= policy.max_retries {
            warn!("Task failed after {} attempts", attempts);
            return Err(e);
        }

        sleep(backoff.next_delay()).await;
    }
}
