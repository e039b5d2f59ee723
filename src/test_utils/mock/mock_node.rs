use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::codec::CompressionEncoding;
use tonic::transport::Server;
use tonic::transport::ServerTlsConfig;
use tracing::debug;
use tracing::error;

use super::MockStore;
use crate::proto::etcdserverpb::kv_server::KvServer;
use crate::proto::etcdserverpb::watch_server::WatchServer;
use crate::Error;
use crate::Result;

pub struct MockNode;

impl MockNode {
    /// Serves `store` on an ephemeral port until `rx` fires
    ///
    /// With `tls` set, clients must present a certificate signed by its
    /// client CA.
    pub async fn mock_listener(
        store: MockStore,
        rx: oneshot::Receiver<()>,
        tls: Option<ServerTlsConfig>,
    ) -> Result<(u16, SocketAddr)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let port = addr.port();
        debug!("starting mock store:port={port}");

        let mut builder = Server::builder();
        if let Some(tls) = tls {
            builder = builder
                .tls_config(tls)
                .map_err(|e| Error::InvalidConfig(format!("mock server TLS config: {e}")))?;
        }

        let router = builder
            .add_service(
                KvServer::new(store.clone())
                    .accept_compressed(CompressionEncoding::Gzip)
                    .send_compressed(CompressionEncoding::Gzip),
            )
            .add_service(
                WatchServer::new(store)
                    .accept_compressed(CompressionEncoding::Gzip)
                    .send_compressed(CompressionEncoding::Gzip),
            );

        tokio::spawn(async move {
            let served = router
                .serve_with_incoming_shutdown(tokio_stream::wrappers::TcpListenerStream::new(listener), async {
                    rx.await.ok();
                })
                .await;
            if let Err(e) = served {
                error!("mock store stopped: {}", e);
            }
        });

        Ok((port, addr))
    }

    pub fn endpoint(
        port: u16,
        tls: bool,
    ) -> String {
        let scheme = if tls { "https" } else { "http" };
        format!("{scheme}://127.0.0.1:{port}")
    }

    /// Binds and releases a port so nothing listens on it
    pub async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);
        port
    }
}
