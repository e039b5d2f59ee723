use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Endpoint;
use tonic::Request;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::async_task::Backoff;
use crate::proto::etcdserverpb::kv_client::KvClient;
use crate::proto::etcdserverpb::RangeRequest;
use crate::BackoffPolicy;
use crate::ConnectionError;
use crate::ConnectionFailureReason;
use crate::NetworkConfig;

/// Markers of a failed TLS negotiation in a transport error chain
const TLS_FAILURE_MARKERS: [&str; 6] = ["certificate", "tls", "handshake", "x509", "unknownissuer", "alert"];
const TIMEOUT_MARKERS: [&str; 3] = ["timed out", "timeout", "deadline"];

/// Manages connections to store members
///
/// Every endpoint that answered during [`create`](ConnectionPool::create)
/// gets a channel; requests are spread over them round-robin. Tonic's
/// `Channel` is thread-safe and reference-counted, clones are cheap.
#[derive(Clone)]
pub struct ConnectionPool {
    channels: Vec<(String, Channel)>,
    next: Arc<AtomicUsize>,
}

impl ConnectionPool {
    /// Dials all endpoints until at least one connects or the budget runs out
    ///
    /// # Behavior
    /// 1. Connects to every endpoint concurrently
    /// 2. Keeps every channel that connected
    /// 3. If none did, backs off and tries again while budget remains
    ///
    /// TLS failures are returned at once, retrying cannot fix them.
    pub(crate) async fn create(
        endpoints: &[String],
        network: &NetworkConfig,
        tls: Option<ClientTlsConfig>,
        retry_max_duration: Duration,
        backoff_policy: BackoffPolicy,
    ) -> std::result::Result<Self, ConnectionError> {
        let deadline = Instant::now() + retry_max_duration;
        let mut backoff = Backoff::new(backoff_policy);

        loop {
            let round = Self::build_connections(endpoints, network, tls.as_ref());
            let last_error = match timeout_at(deadline, round).await {
                Ok(Ok(channels)) => {
                    return Ok(Self {
                        channels,
                        next: Arc::new(AtomicUsize::new(0)),
                    });
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    error!("connect failed: {}", e);
                    return Err(e);
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    return Err(ConnectionError::timeout(format!(
                        "no endpoint of {endpoints:?} answered within {retry_max_duration:?}"
                    )));
                }
            };

            let delay = backoff.next_delay();
            if Instant::now() + delay >= deadline {
                error!("connect retry budget {:?} exhausted: {}", retry_max_duration, last_error);
                return Err(last_error);
            }
            warn!(
                attempt = backoff.attempts(),
                "connect round failed, retrying in {:?}: {}", delay, last_error
            );
            sleep(delay).await;
        }
    }

    /// One connect round over all endpoints
    async fn build_connections(
        endpoints: &[String],
        network: &NetworkConfig,
        tls: Option<&ClientTlsConfig>,
    ) -> std::result::Result<Vec<(String, Channel)>, ConnectionError> {
        let attempts = endpoints
            .iter()
            .map(|addr| async move { (addr.clone(), Self::create_channel(addr, network, tls).await) });

        let mut channels = Vec::new();
        let mut failures = Vec::new();
        for (addr, result) in join_all(attempts).await {
            match result {
                Ok(channel) => channels.push((addr, channel)),
                Err(e) => {
                    warn!("connect to {} failed: {}", addr, e);
                    failures.push(e);
                }
            }
        }

        if channels.is_empty() {
            Err(merge_failures(failures))
        } else {
            Ok(channels)
        }
    }

    pub(super) async fn create_channel(
        addr: &str,
        network: &NetworkConfig,
        tls: Option<&ClientTlsConfig>,
    ) -> std::result::Result<Channel, ConnectionError> {
        debug!("create_channel, addr = {:?}", addr);
        let mut endpoint = Endpoint::from_shared(addr.to_string())
            .map_err(|e| ConnectionError::unreachable(format!("{addr}: {e}")))?
            .connect_timeout(network.connect_timeout)
            .tcp_keepalive(Some(network.tcp_keepalive))
            .http2_keep_alive_interval(network.http2_keepalive_interval)
            .keep_alive_timeout(network.http2_keepalive_timeout)
            .keep_alive_while_idle(true);

        if let Some(tls) = tls.filter(|_| addr.starts_with("https://")) {
            endpoint = endpoint
                .tls_config(tls.clone())
                .map_err(|e| ConnectionError::tls(format!("{addr}: {}", error_chain(&e).join(": "))))?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| classify_transport_failure(addr, error_chain(&e)))?;

        let secure = tls.is_some() && addr.starts_with("https://");
        Self::check_health(addr, channel.clone(), network, secure).await?;
        Ok(channel)
    }

    /// Sends one serializable `Range` over a fresh channel
    ///
    /// The client side of a TLS 1.3 handshake completes before the server has
    /// checked the client certificate, so a refused certificate only shows
    /// on the first request. Any answer from the store, error statuses
    /// included, proves the channel is usable.
    async fn check_health(
        addr: &str,
        channel: Channel,
        network: &NetworkConfig,
        secure: bool,
    ) -> std::result::Result<(), ConnectionError> {
        let mut client = KvClient::new(channel);
        let mut request = Request::new(RangeRequest::health_check());
        request.set_timeout(network.request_timeout);

        let status = match timeout(network.request_timeout, client.range(request)).await {
            Ok(Ok(_)) => return Ok(()),
            Ok(Err(status)) => status,
            Err(_) => {
                return Err(ConnectionError::timeout(format!(
                    "{addr}: health check unanswered within {:?}",
                    network.request_timeout
                )));
            }
        };

        // Statuses sent by the store carry no transport source
        if status.source().is_none() {
            debug!("health check of {} answered with {:?}", addr, status.code());
            return Ok(());
        }

        let failure = classify_transport_failure(addr, error_chain(&status));
        if secure && failure.reason == ConnectionFailureReason::EndpointUnreachable {
            return Err(ConnectionError::tls(format!(
                "{} (connection dropped after the handshake, client certificate refused)",
                failure.detail
            )));
        }
        Err(failure)
    }

    /// Next channel in round-robin order
    pub(crate) fn next_channel(&self) -> Channel {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.channels.len();
        self.channels[i].1.clone()
    }

    pub(crate) fn endpoints(&self) -> Vec<String> {
        self.channels.iter().map(|(addr, _)| addr.clone()).collect()
    }
}

/// Display of an error and each of its sources, outermost first
pub(super) fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(e) = source {
        chain.push(e.to_string());
        source = e.source();
    }
    chain
}

/// Maps a transport error chain onto a connection failure reason
pub(super) fn classify_transport_failure(
    addr: &str,
    chain: Vec<String>,
) -> ConnectionError {
    let detail = format!("{addr}: {}", chain.join(": "));
    let text = detail.to_lowercase();

    if TLS_FAILURE_MARKERS.iter().any(|m| text.contains(m)) {
        ConnectionError::tls(detail)
    } else if TIMEOUT_MARKERS.iter().any(|m| text.contains(m)) {
        ConnectionError::timeout(detail)
    } else {
        ConnectionError::unreachable(detail)
    }
}

/// Reduces per-endpoint failures of one round to a single error
///
/// A TLS failure on any endpoint wins, then unreachable, then timeout.
pub(super) fn merge_failures(failures: Vec<ConnectionError>) -> ConnectionError {
    let pick = |reason| failures.iter().find(|e| e.reason == reason).map(|e| e.reason);
    let reason = pick(ConnectionFailureReason::TlsHandshakeFailed)
        .or_else(|| pick(ConnectionFailureReason::EndpointUnreachable))
        .unwrap_or(ConnectionFailureReason::Timeout);

    let detail = failures.iter().map(|e| e.detail.as_str()).collect::<Vec<_>>().join("; ");
    ConnectionError { reason, detail }
}
