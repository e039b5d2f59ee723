//! Event Handler: turns delivered batches into log lines and metrics.
//!
//! Nothing here writes back to the store, the publisher would otherwise see
//! its own feedback loop through the watch.

use std::borrow::Cow;

use tracing::error;
use tracing::info;
use tracing::warn;

use crate::metrics::WATCH_EVENTS_RECEIVED;
use crate::ChangeBatch;
use crate::Error;
use crate::EventKind;
use crate::HandlerError;


/// Logs one record per event, in commit order
pub fn handle(batch: ChangeBatch) -> std::result::Result<(), HandlerError> {
    for event in &batch {
        info!(
            kind = %event.kind,
            revision = event.mod_revision,
            "watch response, key={} value={}",
            display_bytes(&event.key),
            display_bytes(&event.value)
        );
        WATCH_EVENTS_RECEIVED.with_label_values(&[kind_label(event.kind)]).inc();
    }
    Ok(())
}

/// Error sink for the watcher
pub fn handle_error(error: &Error) {
    match error {
        Error::Watch(e) if e.is_fatal() => error!("watch stopped: {}", e),
        Error::Handler(e) => warn!("batch handler failed: {}", e),
        e => warn!("error happened when watching: {}", e),
    }
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Put => "put",
        EventKind::Delete => "delete",
    }
}

/// Keys and values are opaque bytes, show them as text when they are
fn display_bytes(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}
