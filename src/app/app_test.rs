use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::Instrument;
use tracing_test::traced_test;

use crate::handler;
use crate::test_utils::eventually;
use crate::test_utils::MockNode;
use crate::test_utils::MockStore;
use crate::test_utils::TestPki;
use crate::App;
use crate::BackoffPolicy;
use crate::ChangeBatch;
use crate::ChangeEvent;
use crate::ClusterConfig;
use crate::ConnectionFailureReason;
use crate::Error;
use crate::EventKind;
use crate::PublisherConfig;
use crate::Settings;
use crate::TlsConfig;

fn settings(endpoint: String) -> Settings {
    Settings {
        cluster: ClusterConfig {
            endpoints: vec![endpoint],
            retry_max_duration: Duration::from_secs(2),
            ..Default::default()
        },
        tls: TlsConfig::disabled(),
        publisher: PublisherConfig {
            interval: Duration::from_millis(200),
            write_retry: BackoffPolicy {
                max_retries: 2,
                timeout_ms: 1000,
                base_delay_ms: 50,
                max_delay_ms: 100,
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn start_store() -> (MockStore, String, oneshot::Sender<()>) {
    let store = MockStore::new();
    let (tx, rx) = oneshot::channel::<()>();
    let (port, _addr) = MockNode::mock_listener(store.clone(), rx, None).await.unwrap();
    (store, MockNode::endpoint(port, false), tx)
}

/// Logs through the production handler and keeps a copy of every event
fn collecting_handler() -> (
    impl Fn(ChangeBatch) -> Result<(), crate::HandlerError> + Send + 'static,
    Arc<Mutex<Vec<ChangeEvent>>>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let on_batch = move |batch: ChangeBatch| {
        sink.lock().extend(batch.events().iter().cloned());
        handler::handle(batch)
    };
    (on_batch, seen)
}

fn published_values(seen: &Mutex<Vec<ChangeEvent>>) -> Vec<String> {
    seen.lock()
        .iter()
        .filter(|e| e.key.as_ref() == b"test" && e.kind == EventKind::Put)
        .map(|e| String::from_utf8_lossy(&e.value).into_owned())
        .collect()
}

#[tokio::test]
#[traced_test]
async fn test_watch_and_publish_scenario() {
    let (store, endpoint, _server) = start_store().await;
    let (on_batch, seen) = collecting_handler();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let app = tokio::spawn(
        App::new(settings(endpoint))
            .run_with(shutdown_rx, on_batch, handler::handle_error)
            .in_current_span(),
    );

    assert!(eventually(Duration::from_secs(5), || published_values(&seen).len() >= 3).await);
    store.emit(&[("test/x", "1")]);
    assert!(
        eventually(Duration::from_secs(2), || {
            seen.lock().iter().any(|e| e.key.as_ref() == b"test/x")
        })
        .await
    );

    shutdown_tx.send(()).unwrap();
    app.await.unwrap().unwrap();

    assert_eq!(published_values(&seen)[..3], ["0", "1", "2"]);
    assert_eq!(store.put_values("test")[..3], ["0", "1", "2"]);
    assert!(seen.lock().iter().all(|e| e.key.starts_with(b"test")));
    assert!(logs_contain("key=test/x value=1"));
    assert!(logs_contain("key=test value=0"));
}

#[tokio::test]
async fn test_reset_stream_is_resubscribed_without_gaps() {
    let (store, endpoint, _server) = start_store().await;
    let (on_batch, seen) = collecting_handler();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let app = tokio::spawn(App::new(settings(endpoint)).run_with(shutdown_rx, on_batch, handler::handle_error));

    assert!(eventually(Duration::from_secs(5), || !published_values(&seen).is_empty()).await);
    store.reset_streams();
    assert!(eventually(Duration::from_secs(5), || published_values(&seen).len() >= 4).await);

    shutdown_tx.send(()).unwrap();
    app.await.unwrap().unwrap();

    let values = published_values(&seen);
    let expected: Vec<String> = (0..values.len()).map(|n| n.to_string()).collect();
    assert_eq!(values, expected);
}

#[tokio::test]
async fn test_watch_survives_publisher_halt() {
    let (store, endpoint, _server) = start_store().await;
    store.fail_next_puts(usize::MAX);
    let (on_batch, seen) = collecting_handler();
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let app = tokio::spawn(App::new(settings(endpoint)).run_with(shutdown_rx, on_batch, handler::handle_error));

    // two attempts and one backoff delay, then the publisher gives up
    tokio::time::sleep(Duration::from_millis(500)).await;
    store.emit(&[("test/y", "still watching")]);
    assert!(
        eventually(Duration::from_secs(2), || {
            seen.lock().iter().any(|e| e.key.as_ref() == b"test/y")
        })
        .await
    );
    assert_eq!(store.put_count(), 0);

    shutdown_tx.send(()).unwrap();
    app.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_invalid_certificates_stop_startup() {
    let pki = TestPki::generate();
    let store = MockStore::new();
    let (_server, rx) = oneshot::channel::<()>();
    let (port, _addr) = MockNode::mock_listener(store.clone(), rx, Some(pki.server_tls_config()))
        .await
        .unwrap();

    let mut settings = settings(MockNode::endpoint(port, true));
    settings.tls = pki.client_tls_config();
    settings.tls.certificate_authority_root_path = pki.write("broken-ca.cer", "garbage");

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    let result = App::new(settings).run(shutdown_rx).await;

    match result {
        Err(Error::Connection(e)) => assert_eq!(e.reason, ConnectionFailureReason::TlsHandshakeFailed),
        other => panic!("expected TLS failure, got {other:?}"),
    }
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn test_mismatched_keys_are_rejected() {
    let mut settings = settings("http://127.0.0.1:2379".into());
    settings.publisher.key = "other".into();

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    assert!(matches!(
        App::new(settings).run(shutdown_rx).await,
        Err(Error::InvalidConfig(_))
    ));
}

#[tokio::test]
#[traced_test]
async fn test_shutdown_stops_publisher_then_watch_then_connection() {
    let (store, endpoint, _server) = start_store().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let app = tokio::spawn(App::new(settings(endpoint)).run(shutdown_rx).in_current_span());

    assert!(eventually(Duration::from_secs(5), || store.put_count() >= 1).await);
    shutdown_tx.send(()).unwrap();
    app.await.unwrap().unwrap();

    let writes = store.put_count();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.put_count(), writes);

    logs_assert(|lines: &[&str]| {
        let position = |needle: &str| {
            lines
                .iter()
                .position(|line| line.contains(needle))
                .ok_or_else(|| format!("missing log line {needle:?}"))
        };
        let publisher = position("publisher stopped at value")?;
        let watch = position("watch on \"test\" stopped")?;
        let connection = position("connection to")?;
        if publisher < watch && watch < connection {
            Ok(())
        } else {
            Err(format!("unexpected order {publisher} {watch} {connection}"))
        }
    });
}
