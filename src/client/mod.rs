//! Secure Connection Manager
//!
//! Owns the tonic channels to the store and hands out cheap, cloneable
//! [`Connection`] handles:
//! - [`ConnectionBuilder`] - endpoint list, TLS material and retry budget
//! - [`ConnectionPool`] - one channel per reachable endpoint
//! - `put` through [`KvWriter`](crate::KvWriter)
//! - `watch` through [`WatchSource`](crate::WatchSource)
//!
//! # Basic Usage
//! ```no_run
//! use etcd_pulse::{Connection, TlsConfig};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let connection = Connection::builder(vec!["https://127.0.0.1:2379".into()])
//!         .tls(TlsConfig::default())
//!         .retry_max_duration(Duration::from_secs(10))
//!         .connect()
//!         .await
//!         .unwrap();
//!
//!     println!("connected to {:?}", connection.endpoints());
//!     connection.close();
//! }
//! ```

mod builder;
mod kv;
mod pool;
mod tls;
mod watch;

pub use builder::*;
pub use pool::*;
pub(crate) use tls::*;


use std::sync::Arc;

use parking_lot::RwLock;
use tonic::codec::CompressionEncoding;
use tonic::transport::Channel;
use tracing::info;

use crate::proto::etcdserverpb::kv_client::KvClient;
use crate::proto::etcdserverpb::watch_client::WatchClient;
use crate::NetworkConfig;
use crate::Result;
use crate::Settings;

/// Shared handle to the store
///
/// Clones share the same channels and may be used concurrently from any
/// task. After [`close`](Connection::close) every operation fails with a
/// `ConnectionClosed` error.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    /// None once closed
    pool: RwLock<Option<ConnectionPool>>,
    network: NetworkConfig,
    endpoints: Vec<String>,
}

impl Connection {
    /// Create a configured connection builder
    ///
    /// # Arguments
    /// * `endpoints` - Store members to dial, at least one required
    pub fn builder(endpoints: Vec<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(endpoints)
    }

    /// Connects with every section of `settings` that concerns the store
    pub async fn connect(settings: &Settings) -> Result<Self> {
        Self::builder(settings.cluster.endpoints.clone())
            .network(settings.network.clone())
            .tls(settings.tls.clone())
            .retry_max_duration(settings.cluster.retry_max_duration)
            .connect_backoff(settings.cluster.connect_backoff)
            .connect()
            .await
    }

    pub(crate) fn new(
        pool: ConnectionPool,
        network: NetworkConfig,
    ) -> Self {
        let endpoints = pool.endpoints();
        Self {
            inner: Arc::new(ConnectionInner {
                pool: RwLock::new(Some(pool)),
                network,
                endpoints,
            }),
        }
    }

    /// Endpoints that were reachable when the connection was built
    pub fn endpoints(&self) -> &[String] {
        &self.inner.endpoints
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.read().is_none()
    }

    /// Drops the channels held by this connection. Idempotent.
    pub fn close(&self) {
        if self.inner.pool.write().take().is_some() {
            info!("connection to {:?} closed", self.inner.endpoints);
        }
    }

    pub(crate) fn network(&self) -> &NetworkConfig {
        &self.inner.network
    }

    fn channel(&self) -> Option<Channel> {
        self.inner.pool.read().as_ref().map(ConnectionPool::next_channel)
    }

    pub(crate) fn kv_client(&self) -> Option<KvClient<Channel>> {
        let mut client = KvClient::new(self.channel()?);
        if self.inner.network.enable_compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        Some(client)
    }

    pub(crate) fn watch_client(&self) -> Option<WatchClient<Channel>> {
        let mut client = WatchClient::new(self.channel()?);
        if self.inner.network.enable_compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        Some(client)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoints", &self.inner.endpoints)
            .field("closed", &self.is_closed())
            .finish()
    }
}
