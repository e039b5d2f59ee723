//! Periodic Publisher
//!
//! Writes the decimal form of an increasing counter to one key on a fixed
//! cadence, independent of the watch stream.

mod counter;
use counter::Counter;


use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::metrics::LAST_PUBLISHED_VALUE;
use crate::metrics::PUBLISHED_VALUES;
use crate::metrics::PUBLISH_FAILURES;
use crate::BackoffPolicy;
use crate::PublisherConfig;
use crate::Result;
use crate::WriteError;

/// Anything able to store a value under a key
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvWriter: Send + Sync + 'static {
    async fn put(
        &self,
        key: Bytes,
        value: Bytes,
    ) -> std::result::Result<(), WriteError>;
}

pub struct PeriodicPublisher<W: KvWriter> {
    writer: Arc<W>,
    key: Bytes,
    interval: Duration,
    write_retry: BackoffPolicy,
    counter: Counter,
}

impl<W: KvWriter> PeriodicPublisher<W> {
    pub fn new(
        writer: Arc<W>,
        config: &PublisherConfig,
    ) -> Self {
        Self {
            writer,
            key: Bytes::from(config.key.clone()),
            interval: config.interval,
            write_retry: config.write_retry,
            counter: Counter::default(),
        }
    }

    /// Publishes `0, 1, 2, ...` until shutdown
    ///
    /// The first value is written at once. A dropped shutdown sender counts
    /// as a shutdown request.
    ///
    /// # Errors
    /// `Error::Write` once a single value could not be stored within the
    /// retry policy; nothing is written after that.
    pub async fn run_forever(
        mut self,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "publishing to {:?} every {:?}",
            String::from_utf8_lossy(&self.key),
            self.interval
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let value = self.counter.current();
            let write = self.publish(value);
            let result = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                result = write => result,
            };

            match result {
                Ok(()) => {
                    debug!(value, "published");
                    PUBLISHED_VALUES.inc();
                    LAST_PUBLISHED_VALUE.set(value);
                    self.counter.advance();
                }
                Err(e) => {
                    PUBLISH_FAILURES.inc();
                    error!("publisher halted, value {} could not be written: {}", value, e);
                    return Err(e.into());
                }
            }
        }

        info!("publisher stopped at value {}", self.counter.current());
        Ok(())
    }

    async fn publish(
        &self,
        value: i64,
    ) -> std::result::Result<(), WriteError> {
        let payload = Bytes::from(value.to_string());
        task_with_timeout_and_exponential_backoff(
            || {
                let writer = self.writer.clone();
                let key = self.key.clone();
                let payload = payload.clone();
                async move { writer.put(key, payload).await }
            },
            self.write_retry,
        )
        .await
    }
}
