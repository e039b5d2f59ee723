use futures::stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::async_trait;
use tonic::Streaming;
use tracing::debug;

use super::Connection;
use crate::constants::WATCH_REQUEST_BUFFER;
use crate::proto::etcdserverpb::WatchRequest;
use crate::proto::etcdserverpb::WatchResponse;
use crate::NotificationStream;
use crate::WatchNotification;
use crate::WatchOptions;
use crate::WatchSource;
use crate::WatchStreamError;

#[async_trait]
impl WatchSource for Connection {
    /// Opens one bidirectional watch stream with a single create request
    ///
    /// The request half stays open for as long as the returned stream is
    /// alive; the store cancels the watch when it closes. The stream ends
    /// after its first error.
    async fn open(
        &self,
        options: WatchOptions,
    ) -> Result<NotificationStream, WatchStreamError> {
        let mut client = self.watch_client().ok_or(WatchStreamError::ConnectionClosed)?;

        let (tx, rx) = mpsc::channel(WATCH_REQUEST_BUFFER);
        let create = WatchRequest::create_prefix(
            options.key_prefix.clone(),
            options.start_revision,
            options.progress_notify,
        );
        tx.send(create).await.map_err(|_| WatchStreamError::StreamClosed)?;

        let inbound = client.watch(ReceiverStream::new(rx)).await?.into_inner();
        debug!(
            start_revision = options.start_revision,
            "watch stream opened on prefix {}",
            String::from_utf8_lossy(&options.key_prefix)
        );

        Ok(notifications(inbound, tx))
    }
}

/// Decodes responses until the first error, keeping `requests` alive
fn notifications(
    inbound: Streaming<WatchResponse>,
    requests: mpsc::Sender<WatchRequest>,
) -> NotificationStream {
    stream::unfold(Some((inbound, requests)), |state| async move {
        let (mut inbound, requests) = state?;
        match inbound.next().await {
            Some(Ok(response)) => match WatchNotification::try_from(response) {
                Ok(notification) => Some((Ok(notification), Some((inbound, requests)))),
                Err(e) => Some((Err(e), None)),
            },
            Some(Err(status)) => Some((Err(WatchStreamError::from(status)), None)),
            None => None,
        }
    })
    .boxed()
}
