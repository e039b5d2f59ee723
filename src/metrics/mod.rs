use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref WATCH_EVENTS_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events_received", "Change events delivered to the handler"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_STREAM_ERRORS: IntCounter =
        IntCounter::new("watch_stream_errors", "Watch stream failures")
            .expect("metric can not be created");

    pub static ref WATCH_RESTARTS: IntCounter =
        IntCounter::new("watch_restarts", "Watch resubscribe attempts")
            .expect("metric can not be created");

    pub static ref HANDLER_ERRORS: IntCounter =
        IntCounter::new("handler_errors", "Failures raised by the batch handler")
            .expect("metric can not be created");

    pub static ref PUBLISHED_VALUES: IntCounter =
        IntCounter::new("published_values", "Counter values acknowledged by the store")
            .expect("metric can not be created");

    pub static ref PUBLISH_FAILURES: IntCounter =
        IntCounter::new("publish_failures", "Writes that failed after every retry")
            .expect("metric can not be created");

    pub static ref LAST_PUBLISHED_VALUE: IntGauge =
        IntGauge::new("last_published_value", "Last counter value acknowledged by the store")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(WATCH_EVENTS_RECEIVED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_STREAM_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_RESTARTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(HANDLER_ERRORS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PUBLISHED_VALUES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PUBLISH_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(LAST_PUBLISHED_VALUE.clone()))
        .expect("collector can be registered");
}

/// Serves `/metrics` until the shutdown signal fires
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("metrics server listening on port {port}");
    let (_, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        if shutdown_signal.changed().await.is_err() {
            warn!("metrics shutdown sender dropped");
        }
    });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics(&REGISTRY))
}

/// Text exposition of every metric in `registry`
pub fn encode_metrics(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
