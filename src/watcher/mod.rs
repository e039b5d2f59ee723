//! Change Watcher
//!
//! Keeps one prefix watch alive against a [`WatchSource`], delivers every
//! batch of changes to a handler in commit order and resubscribes after
//! stream failures from the next revision not yet delivered.

mod subscription;
pub use subscription::*;


use std::any::Any;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio::time::timeout;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing::Instrument;

use crate::async_task::Backoff;
use crate::metrics::HANDLER_ERRORS;
use crate::metrics::WATCH_RESTARTS;
use crate::metrics::WATCH_STREAM_ERRORS;
use crate::ChangeBatch;
use crate::Error;
use crate::HandlerError;
use crate::Result;
use crate::WatchConfig;
use crate::WatchNotification;
use crate::WatchStreamError;

/// Decoded watch responses; the stream ends after its first error
pub type NotificationStream = Pin<Box<dyn Stream<Item = std::result::Result<WatchNotification, WatchStreamError>> + Send>>;

/// Parameters of one watch stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub key_prefix: Bytes,
    /// First revision to deliver, 0 meaning "from now on"
    pub start_revision: i64,
    pub progress_notify: bool,
}

/// Anything able to open a prefix watch stream
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WatchSource: Send + Sync + 'static {
    async fn open(
        &self,
        options: WatchOptions,
    ) -> std::result::Result<NotificationStream, WatchStreamError>;
}

pub struct ChangeWatcher<S: WatchSource> {
    source: Arc<S>,
    config: WatchConfig,
}

impl<S: WatchSource> ChangeWatcher<S> {
    pub fn new(
        source: Arc<S>,
        config: WatchConfig,
    ) -> Self {
        Self { source, config }
    }

    /// Starts a receive loop on its own task
    ///
    /// `on_batch` runs inside the loop, one batch at a time. Its errors,
    /// its panics and every stream failure are passed to `on_error`; only a
    /// malformed payload stops the loop.
    pub fn watch<H, E>(
        &self,
        key_prefix: impl Into<Bytes>,
        on_batch: H,
        on_error: E,
    ) -> Subscription
    where
        H: Fn(ChangeBatch) -> std::result::Result<(), HandlerError> + Send + 'static,
        E: Fn(&Error) + Send + 'static,
    {
        let key_prefix = key_prefix.into();
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let receive_loop = ReceiveLoop {
            source: self.source.clone(),
            config: self.config.clone(),
            key_prefix: key_prefix.clone(),
            next_revision: 0,
            on_batch,
            on_error,
            state_tx,
        };
        let handle = tokio::spawn(receive_loop.run(shutdown_rx).in_current_span());

        Subscription::new(key_prefix, state_rx, shutdown_tx, handle)
    }
}

struct ReceiveLoop<S, H, E> {
    source: Arc<S>,
    config: WatchConfig,
    key_prefix: Bytes,
    /// Resume cursor, 0 until the store told us where "now" is
    next_revision: i64,
    on_batch: H,
    on_error: E,
    state_tx: watch::Sender<SubscriptionState>,
}

impl<S, H, E> ReceiveLoop<S, H, E>
where
    S: WatchSource,
    H: Fn(ChangeBatch) -> std::result::Result<(), HandlerError> + Send + 'static,
    E: Fn(&Error) + Send + 'static,
{
    async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> Result<()> {
        let mut backoff = Backoff::new(self.config.restart_backoff);

        let result = loop {
            let failure = tokio::select! {
                _ = shutdown_rx.changed() => break Ok(()),
                failure = self.subscribe_and_drain(&mut backoff) => failure,
            };

            WATCH_STREAM_ERRORS.inc();
            self.set_state(SubscriptionState::Erroring);

            if failure.is_fatal() {
                error!("watch on {:?} closed: {}", self.prefix_str(), failure);
                (self.on_error)(&Error::Watch(failure.clone()));
                break Err(Error::Watch(failure));
            }

            if let WatchStreamError::Compacted { compact_revision } = failure {
                warn!(
                    "revisions {}..{} were compacted before delivery",
                    self.next_revision, compact_revision
                );
                self.next_revision = compact_revision;
            }
            (self.on_error)(&Error::Watch(failure));

            self.set_state(SubscriptionState::Restarting);
            WATCH_RESTARTS.inc();
            let delay = backoff.next_delay();
            debug!(attempt = backoff.attempts(), "resubscribing in {:?}", delay);

            tokio::select! {
                _ = shutdown_rx.changed() => break Ok(()),
                _ = sleep(delay) => {}
            }
        };

        self.set_state(SubscriptionState::Closed);
        info!("watch on {:?} stopped", self.prefix_str());
        result
    }

    /// Opens one stream and consumes it; returns why it ended
    async fn subscribe_and_drain(
        &mut self,
        backoff: &mut Backoff,
    ) -> WatchStreamError {
        let options = WatchOptions {
            key_prefix: self.key_prefix.clone(),
            start_revision: self.next_revision,
            progress_notify: self.config.progress_notify,
        };

        let mut stream = match timeout(self.config.restart_backoff.timeout(), self.source.open(options)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return e,
            Err(_) => return WatchStreamError::Disconnected("watch open timed out".into()),
        };

        debug!(start_revision = self.next_revision, "watch stream opened");

        while let Some(item) = stream.next().await {
            // Active once the store acknowledges the watch
            if matches!(&item, Ok(notification) if notification.created && !notification.canceled) {
                self.set_state(SubscriptionState::Active);
                backoff.reset();
                info!(
                    start_revision = self.next_revision,
                    "watching prefix {:?}",
                    self.prefix_str()
                );
            }
            let delivered = item.and_then(|notification| self.deliver(notification));
            if let Err(e) = delivered {
                return e;
            }
        }
        WatchStreamError::StreamClosed
    }

    /// Advances the cursor and hands events to the handler
    fn deliver(
        &mut self,
        notification: WatchNotification,
    ) -> std::result::Result<(), WatchStreamError> {
        if notification.canceled {
            return Err(if notification.compact_revision > 0 {
                WatchStreamError::Compacted {
                    compact_revision: notification.compact_revision,
                }
            } else {
                WatchStreamError::Canceled {
                    reason: notification.cancel_reason,
                }
            });
        }

        if let Some(stray) = notification.events.iter().find(|e| !e.key.starts_with(&self.key_prefix)) {
            return Err(WatchStreamError::MalformedPayload(format!(
                "event key {:?} outside prefix {:?}",
                String::from_utf8_lossy(&stray.key),
                self.prefix_str()
            )));
        }

        let Some(batch) = ChangeBatch::new(notification.events) else {
            self.observe_revision(notification.created, notification.header_revision);
            return Ok(());
        };

        self.next_revision = batch.last_revision() + 1;
        debug!(events = batch.len(), next_revision = self.next_revision, "delivering batch");

        let handled = match catch_unwind(AssertUnwindSafe(|| (self.on_batch)(batch))) {
            Ok(result) => result,
            Err(payload) => Err(HandlerError(format!("handler panicked: {}", panic_message(&*payload)))),
        };
        if let Err(e) = handled {
            HANDLER_ERRORS.inc();
            (self.on_error)(&Error::Handler(e));
        }
        Ok(())
    }

    /// Creation acknowledgements and progress notifications carry no events
    fn observe_revision(
        &mut self,
        created: bool,
        header_revision: i64,
    ) {
        if header_revision <= 0 {
            return;
        }
        if created {
            // A resumed watch replays from its start revision
            if self.next_revision == 0 {
                self.next_revision = header_revision + 1;
            }
        } else {
            self.next_revision = self.next_revision.max(header_revision + 1);
        }
    }

    fn set_state(
        &self,
        state: SubscriptionState,
    ) {
        self.state_tx.send_replace(state);
    }

    fn prefix_str(&self) -> String {
        String::from_utf8_lossy(&self.key_prefix).into_owned()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
