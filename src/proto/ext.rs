use bytes::Bytes;

use super::etcdserverpb::watch_request::RequestUnion;
use super::etcdserverpb::PutRequest;
use super::etcdserverpb::RangeRequest;
use super::etcdserverpb::WatchCreateRequest;
use super::etcdserverpb::WatchRequest;
use super::etcdserverpb::WatchResponse;
use super::mvccpb::event::EventType;
use super::mvccpb::Event;
use crate::ChangeEvent;
use crate::EventKind;
use crate::WatchNotification;
use crate::WatchStreamError;

/// Exclusive end of the key range covering every key that starts with
/// `prefix`.
///
/// The last byte below `0xff` is incremented and the tail dropped. A prefix
/// made only of `0xff` bytes (or an empty one) has no upper bound, which the
/// store spells as `[0]`.
pub fn prefix_range_end(prefix: &[u8]) -> Bytes {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return Bytes::from(end);
        }
    }
    Bytes::from_static(&[0])
}

impl PutRequest {
    pub fn new(
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Key read by the connect health check, the same one `etcdctl endpoint health` uses
pub const HEALTH_KEY: &[u8] = b"health";

impl RangeRequest {
    /// Cheapest read the store answers: a local count of one key
    pub fn health_check() -> Self {
        Self {
            key: Bytes::from_static(HEALTH_KEY),
            serializable: true,
            count_only: true,
            ..Default::default()
        }
    }
}

impl WatchRequest {
    /// Create a prefix watch starting at `start_revision`, 0 meaning "now"
    pub fn create_prefix(
        prefix: Bytes,
        start_revision: i64,
        progress_notify: bool,
    ) -> Self {
        let range_end = prefix_range_end(&prefix);
        Self {
            request_union: Some(RequestUnion::CreateRequest(WatchCreateRequest {
                key: prefix,
                range_end,
                start_revision,
                progress_notify,
                ..Default::default()
            })),
        }
    }

    pub fn as_create(&self) -> Option<&WatchCreateRequest> {
        match &self.request_union {
            Some(RequestUnion::CreateRequest(create)) => Some(create),
            _ => None,
        }
    }
}

impl TryFrom<Event> for ChangeEvent {
    type Error = WatchStreamError;

    fn try_from(event: Event) -> Result<Self, Self::Error> {
        let kind = match EventType::try_from(event.r#type) {
            Ok(EventType::Put) => EventKind::Put,
            Ok(EventType::Delete) => EventKind::Delete,
            Err(_) => {
                return Err(WatchStreamError::MalformedPayload(format!(
                    "unknown event type {}",
                    event.r#type
                )))
            }
        };

        let kv = event
            .kv
            .ok_or_else(|| WatchStreamError::MalformedPayload("event without key-value".into()))?;

        Ok(ChangeEvent {
            key: kv.key,
            value: kv.value,
            kind,
            mod_revision: kv.mod_revision,
        })
    }
}

impl TryFrom<WatchResponse> for WatchNotification {
    type Error = WatchStreamError;

    fn try_from(response: WatchResponse) -> Result<Self, Self::Error> {
        let events = response
            .events
            .into_iter()
            .map(ChangeEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(WatchNotification {
            watch_id: response.watch_id,
            header_revision: response.header.map(|h| h.revision).unwrap_or_default(),
            created: response.created,
            canceled: response.canceled,
            cancel_reason: response.cancel_reason,
            compact_revision: response.compact_revision,
            events,
        })
    }
}
