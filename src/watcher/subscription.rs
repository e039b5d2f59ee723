use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::Result;

/// Lifecycle of a watch registration
///
/// `Starting → Active → (Erroring → Restarting → Active)* → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Starting,
    Active,
    Erroring,
    Restarting,
    Closed,
}

/// Handle to a running watch loop
///
/// Dropping the handle stops the loop as well; [`close`](Subscription::close)
/// additionally waits for it and returns its outcome.
pub struct Subscription {
    key_prefix: Bytes,
    state_rx: watch::Receiver<SubscriptionState>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl Subscription {
    pub(super) fn new(
        key_prefix: Bytes,
        state_rx: watch::Receiver<SubscriptionState>,
        shutdown_tx: watch::Sender<()>,
        handle: JoinHandle<Result<()>>,
    ) -> Self {
        Self {
            key_prefix,
            state_rx,
            shutdown_tx,
            handle,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state_rx.borrow()
    }

    /// Resolves once the subscription reaches `state`
    ///
    /// Returns `false` if the loop ended without ever reaching it.
    pub async fn wait_for_state(
        &self,
        state: SubscriptionState,
    ) -> bool {
        let mut rx = self.state_rx.clone();
        let reached = rx.wait_for(|s| *s == state).await.is_ok();
        reached
    }

    /// Resolves once the loop has stopped, on close or on a fatal error
    pub async fn closed(&self) {
        self.wait_for_state(SubscriptionState::Closed).await;
    }

    /// Stops the loop and waits for it
    ///
    /// # Errors
    /// The fatal error that closed the subscription, if any.
    pub async fn close(self) -> Result<()> {
        if self.shutdown_tx.send(()).is_err() {
            debug!("watch loop already stopped");
        }
        self.handle.await?
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key_prefix", &String::from_utf8_lossy(&self.key_prefix))
            .field("state", &self.state())
            .finish()
    }
}
