//! Wires the store connection, the Change Watcher and the Periodic
//! Publisher, and tears them down in order on shutdown.

#[cfg(test)]
mod app_test;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing::Instrument;

use crate::handler;
use crate::metrics;
use crate::ChangeBatch;
use crate::ChangeWatcher;
use crate::Connection;
use crate::Error;
use crate::HandlerError;
use crate::PeriodicPublisher;
use crate::Result;
use crate::Settings;
use crate::SubscriptionState;

pub struct App {
    settings: Settings,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Runs until `shutdown_rx` fires, logging every delivered change
    ///
    /// # Errors
    /// Invalid settings, or a connection that could not be established.
    /// Failures after startup are logged, not returned.
    pub async fn run(
        self,
        shutdown_rx: watch::Receiver<()>,
    ) -> Result<()> {
        self.run_with(shutdown_rx, handler::handle, handler::handle_error).await
    }

    /// [`run`](App::run) with caller supplied batch and error handlers
    pub async fn run_with<H, E>(
        self,
        mut shutdown_rx: watch::Receiver<()>,
        on_batch: H,
        on_error: E,
    ) -> Result<()>
    where
        H: Fn(ChangeBatch) -> std::result::Result<(), HandlerError> + Send + 'static,
        E: Fn(&Error) + Send + 'static,
    {
        let settings = self.settings;
        settings.validate()?;

        let metrics_tx = if settings.monitoring.prometheus_enabled {
            let (tx, rx) = watch::channel(());
            tokio::spawn(metrics::start_server(settings.monitoring.prometheus_port, rx));
            Some(tx)
        } else {
            None
        };

        let connection = match Connection::connect(&settings).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("could not connect to {:?}: {}", settings.cluster.endpoints, e);
                return Err(e);
            }
        };

        let watcher = ChangeWatcher::new(Arc::new(connection.clone()), settings.watch.clone());
        let subscription = watcher.watch(settings.watch.key.clone(), on_batch, on_error);

        // Writes made before the watch is registered would never be seen
        let registered = timeout(
            settings.watch.restart_backoff.timeout(),
            subscription.wait_for_state(SubscriptionState::Active),
        );
        let interrupted = tokio::select! {
            _ = shutdown_rx.changed() => true,
            active = registered => {
                if !matches!(active, Ok(true)) {
                    warn!("watch not active yet, publishing anyway");
                }
                false
            }
        };
        if interrupted {
            info!("shutdown requested during startup");
            if let Err(e) = subscription.close().await {
                warn!("subscription ended with: {}", e);
            }
            connection.close();
            return Ok(());
        }

        let (publisher_tx, publisher_rx) = watch::channel(());
        let publisher = PeriodicPublisher::new(Arc::new(connection.clone()), &settings.publisher);
        let mut publisher_handle = tokio::spawn(publisher.run_forever(publisher_rx).in_current_span());
        info!("watching and publishing on {:?}", settings.watch.key);

        let mut publisher_done = false;
        let mut watcher_done = false;
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("shutdown signal received");
                    break;
                }
                result = &mut publisher_handle, if !publisher_done => {
                    publisher_done = true;
                    log_publisher_exit(result);
                    if !watcher_done {
                        warn!("publisher halted, watch continues");
                    }
                }
                _ = subscription.closed(), if !watcher_done => {
                    watcher_done = true;
                    error!("subscription closed, no further changes will be delivered");
                }
            }
            if publisher_done && watcher_done {
                warn!("publisher and watcher both stopped");
                break;
            }
        }

        info!("stopping publisher");
        if !publisher_done {
            if publisher_tx.send(()).is_err() {
                warn!("publisher already gone");
            }
            log_publisher_exit(publisher_handle.await);
        }

        info!("closing subscription");
        if let Err(e) = subscription.close().await {
            warn!("subscription ended with: {}", e);
        }

        info!("closing connection");
        connection.close();

        if let Some(tx) = metrics_tx {
            if tx.send(()).is_err() {
                warn!("metrics server already gone");
            }
        }
        Ok(())
    }
}

fn log_publisher_exit(result: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("publisher stopped"),
        Ok(Err(e)) => error!("publisher failed: {}", e),
        Err(e) => error!("publisher task failed: {}", Error::TaskFailed(e)),
    }
}
