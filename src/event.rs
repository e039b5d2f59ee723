use std::fmt;

use bytes::Bytes;

/// Kind of mutation observed on a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Key was inserted or updated
    Put,
    /// Key was deleted
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            EventKind::Put => f.write_str("PUT"),
            EventKind::Delete => f.write_str("DELETE"),
        }
    }
}

/// A single observed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: Bytes,
    /// Empty for deletes
    pub value: Bytes,
    pub kind: EventKind,
    /// Store revision that committed this mutation
    pub mod_revision: i64,
}

impl ChangeEvent {
    pub fn put(
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        mod_revision: i64,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: EventKind::Put,
            mod_revision,
        }
    }

    pub fn delete(
        key: impl Into<Bytes>,
        mod_revision: i64,
    ) -> Self {
        Self {
            key: key.into(),
            value: Bytes::new(),
            kind: EventKind::Delete,
            mod_revision,
        }
    }
}

/// Non-empty, commit-ordered events from one watch notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    /// Returns `None` for an empty event list
    pub fn new(events: Vec<ChangeEvent>) -> Option<Self> {
        if events.is_empty() {
            None
        } else {
            Some(Self { events })
        }
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always false, kept for the `len` convention
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Revision of the last committed event in the batch
    pub fn last_revision(&self) -> i64 {
        self.events.last().map(|e| e.mod_revision).unwrap_or_default()
    }
}

impl<'a> IntoIterator for &'a ChangeBatch {
    type Item = &'a ChangeEvent;
    type IntoIter = std::slice::Iter<'a, ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// One decoded watch response
///
/// Responses without events are either the creation acknowledgement or a
/// progress notification; they only carry a revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchNotification {
    pub watch_id: i64,
    /// Store revision when the response was produced
    pub header_revision: i64,
    pub created: bool,
    pub canceled: bool,
    pub cancel_reason: String,
    /// Set when the requested start revision was compacted
    pub compact_revision: i64,
    pub events: Vec<ChangeEvent>,
}
