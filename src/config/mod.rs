//! Configuration for the watch-and-publish client.
//!
//! Every section carries hardcoded defaults that match the reference
//! deployment (a single local etcd member behind mutual TLS). Settings are
//! built in code and checked with [`Settings::validate`] before anything
//! touches the network.

mod cluster;
mod monitoring;
mod network;
mod publisher;
mod retry;
mod tls;
mod watch;
pub use cluster::*;
pub use monitoring::*;
pub use network::*;
pub use publisher::*;
pub use retry::*;
pub use tls::*;
pub use watch::*;


//---
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Store endpoints and the connect retry budget
    pub cluster: ClusterConfig,
    /// Channel level parameters (timeouts, keepalive, compression)
    pub network: NetworkConfig,
    /// Mutual TLS material
    pub tls: TlsConfig,
    /// Watched key prefix and restart policy
    pub watch: WatchConfig,
    /// Publishing cadence and write retry policy
    pub publisher: PublisherConfig,
    /// Metrics settings
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Validates every section and the constraints spanning sections
    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        self.network.validate()?;
        self.tls.validate()?;
        self.watch.validate()?;
        self.publisher.validate()?;
        self.monitoring.validate()?;

        if !self.tls.enable_tls {
            if let Some(endpoint) = self.cluster.endpoints.iter().find(|e| e.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "endpoint {endpoint} requires TLS but tls.enable_tls is false"
                )));
            }
        }

        if self.watch.key != self.publisher.key {
            return Err(Error::InvalidConfig(format!(
                "watch key {:?} and publisher key {:?} must be identical",
                self.watch.key, self.publisher.key
            )));
        }

        Ok(())
    }
}
