use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;

use crate::proto::etcdserverpb::kv_server::Kv;
use crate::proto::etcdserverpb::watch_server::Watch;
use crate::proto::etcdserverpb::PutRequest;
use crate::proto::etcdserverpb::PutResponse;
use crate::proto::etcdserverpb::RangeRequest;
use crate::proto::etcdserverpb::RangeResponse;
use crate::proto::etcdserverpb::ResponseHeader;
use crate::proto::etcdserverpb::WatchCreateRequest;
use crate::proto::etcdserverpb::WatchRequest;
use crate::proto::etcdserverpb::WatchResponse;
use crate::proto::mvccpb::event::EventType;
use crate::proto::mvccpb::Event;
use crate::proto::mvccpb::KeyValue;

const MOCK_WATCH_ID: i64 = 1;

/// In-memory store with a linear revision log
#[derive(Clone)]
pub struct MockStore {
    inner: Arc<StoreState>,
}

struct StoreState {
    log: Mutex<RevisionLog>,
    failing_puts: AtomicUsize,
    commits: broadcast::Sender<Vec<Event>>,
    resets: broadcast::Sender<()>,
}

#[derive(Default)]
struct RevisionLog {
    revision: i64,
    history: Vec<Event>,
    /// Key/value pairs received through `Put`, in arrival order
    puts: Vec<(Bytes, Bytes)>,
}

impl Default for MockStore {
    fn default() -> Self {
        let (commits, _) = broadcast::channel(256);
        let (resets, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(StoreState {
                log: Mutex::new(RevisionLog::default()),
                failing_puts: AtomicUsize::new(0),
                commits,
                resets,
            }),
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits PUTs as another writer would, all in one notification
    pub fn emit(
        &self,
        kvs: &[(&str, &str)],
    ) -> i64 {
        let mut log = self.inner.log.lock();
        let events = kvs
            .iter()
            .map(|(k, v)| log.append(Bytes::copy_from_slice(k.as_bytes()), Bytes::copy_from_slice(v.as_bytes())))
            .collect::<Vec<_>>();
        let _ = self.inner.commits.send(events);
        log.revision
    }

    /// Answers the next `n` puts with `UNAVAILABLE`
    pub fn fail_next_puts(
        &self,
        n: usize,
    ) {
        self.inner.failing_puts.store(n, Ordering::SeqCst);
    }

    /// Aborts every open watch stream with `UNAVAILABLE`
    pub fn reset_streams(&self) {
        let _ = self.inner.resets.send(());
    }

    /// Values written through `Put` to `key`, in arrival order
    pub fn put_values(
        &self,
        key: &str,
    ) -> Vec<String> {
        self.inner
            .log
            .lock()
            .puts
            .iter()
            .filter(|(k, _)| k.as_ref() == key.as_bytes())
            .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    pub fn put_count(&self) -> usize {
        self.inner.log.lock().puts.len()
    }

    pub fn revision(&self) -> i64 {
        self.inner.log.lock().revision
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl RevisionLog {
    fn append(
        &mut self,
        key: Bytes,
        value: Bytes,
    ) -> Event {
        self.revision += 1;
        let event = Event {
            r#type: EventType::Put as i32,
            kv: Some(KeyValue {
                key,
                value,
                create_revision: self.revision,
                mod_revision: self.revision,
                version: 1,
                lease: 0,
            }),
            prev_kv: None,
        };
        self.history.push(event.clone());
        event
    }
}

fn header(revision: i64) -> Option<ResponseHeader> {
    Some(ResponseHeader {
        revision,
        ..Default::default()
    })
}

fn in_range(
    create: &WatchCreateRequest,
    event: &Event,
) -> bool {
    let Some(kv) = &event.kv else {
        return false;
    };
    let key = kv.key.as_ref();
    if create.range_end.is_empty() {
        return key == create.key.as_ref();
    }
    let unbounded = create.range_end.as_ref() == [0];
    key >= create.key.as_ref() && (unbounded || key < create.range_end.as_ref())
}

fn revision_of(event: &Event) -> i64 {
    event.kv.as_ref().map(|kv| kv.mod_revision).unwrap_or_default()
}

#[tonic::async_trait]
impl Kv for MockStore {
    async fn range(
        &self,
        request: Request<RangeRequest>,
    ) -> std::result::Result<Response<RangeResponse>, Status> {
        let request = request.into_inner();
        let log = self.inner.log.lock();
        let exists = log
            .history
            .iter()
            .any(|e| e.kv.as_ref().is_some_and(|kv| kv.key == request.key));

        Ok(Response::new(RangeResponse {
            header: header(log.revision),
            count: i64::from(exists),
            ..Default::default()
        }))
    }

    async fn put(
        &self,
        request: Request<PutRequest>,
    ) -> std::result::Result<Response<PutResponse>, Status> {
        if self.take_injected_failure() {
            return Err(Status::unavailable("injected put failure"));
        }

        let request = request.into_inner();
        let mut log = self.inner.log.lock();
        log.puts.push((request.key.clone(), request.value.clone()));
        let event = log.append(request.key, request.value);
        let _ = self.inner.commits.send(vec![event]);

        Ok(Response::new(PutResponse {
            header: header(log.revision),
            prev_kv: None,
        }))
    }
}

#[tonic::async_trait]
impl Watch for MockStore {
    type WatchStream = Pin<Box<dyn Stream<Item = std::result::Result<WatchResponse, Status>> + Send + 'static>>;

    async fn watch(
        &self,
        request: Request<Streaming<WatchRequest>>,
    ) -> std::result::Result<Response<Self::WatchStream>, Status> {
        let mut inbound = request.into_inner();
        let create = match inbound.message().await? {
            Some(request) => request
                .as_create()
                .cloned()
                .ok_or_else(|| Status::invalid_argument("first watch request must be a create"))?,
            None => return Err(Status::cancelled("watch stream closed before create")),
        };

        // Subscribe before taking the backlog so no commit falls in between
        let (mut commits, mut resets, backlog, revision) = {
            let log = self.inner.log.lock();
            let backlog = if create.start_revision > 0 {
                log.history
                    .iter()
                    .filter(|e| revision_of(e) >= create.start_revision && in_range(&create, e))
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };
            (
                self.inner.commits.subscribe(),
                self.inner.resets.subscribe(),
                backlog,
                log.revision,
            )
        };
        debug!(start_revision = create.start_revision, revision, "mock watch created");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let created = WatchResponse {
                header: header(revision),
                watch_id: MOCK_WATCH_ID,
                created: true,
                ..Default::default()
            };
            if tx.send(Ok(created)).await.is_err() {
                return;
            }
            if !backlog.is_empty() {
                let replay = WatchResponse {
                    header: header(revision),
                    watch_id: MOCK_WATCH_ID,
                    events: backlog,
                    ..Default::default()
                };
                if tx.send(Ok(replay)).await.is_err() {
                    return;
                }
            }

            loop {
                tokio::select! {
                    commit = commits.recv() => {
                        let events: Vec<Event> = match commit {
                            Ok(events) => events
                                .into_iter()
                                .filter(|e| revision_of(e) > revision && in_range(&create, e))
                                .collect(),
                            Err(RecvError::Lagged(_)) => continue,
                            Err(RecvError::Closed) => break,
                        };
                        if events.is_empty() {
                            continue;
                        }
                        let response = WatchResponse {
                            header: header(events.last().map(revision_of).unwrap_or(revision)),
                            watch_id: MOCK_WATCH_ID,
                            events,
                            ..Default::default()
                        };
                        if tx.send(Ok(response)).await.is_err() {
                            break;
                        }
                    }
                    _ = resets.recv() => {
                        let _ = tx.send(Err(Status::unavailable("watch stream reset"))).await;
                        break;
                    }
                    message = inbound.message() => {
                        if !matches!(message, Ok(Some(_))) {
                            break;
                        }
                    }
                }
            }
            debug!("mock watch stream finished");
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
