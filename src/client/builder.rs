use std::time::Duration;

use tracing::info;

use super::Connection;
use super::ConnectionPool;
use super::TlsMaterial;
use crate::config::validate_endpoints;
use crate::BackoffPolicy;
use crate::ClusterConfig;
use crate::Error;
use crate::NetworkConfig;
use crate::Result;
use crate::TlsConfig;

/// Configurable builder for [`Connection`] instances
///
/// # Default Configuration
/// - TLS: enabled, material from `certs/`
/// - Connect Timeout: 1s
/// - Retry budget: 10s
pub struct ConnectionBuilder {
    endpoints: Vec<String>,
    network: NetworkConfig,
    tls: TlsConfig,
    retry_max_duration: Duration,
    connect_backoff: BackoffPolicy,
}

impl ConnectionBuilder {
    /// Create a new builder with default config and specified endpoints
    pub fn new(endpoints: Vec<String>) -> Self {
        let cluster = ClusterConfig::default();
        Self {
            endpoints,
            network: NetworkConfig::default(),
            tls: TlsConfig::default(),
            retry_max_duration: cluster.retry_max_duration,
            connect_backoff: cluster.connect_backoff,
        }
    }

    /// Replaces the channel parameters
    pub fn network(
        mut self,
        network: NetworkConfig,
    ) -> Self {
        self.network = network;
        self
    }

    /// Replaces the TLS settings, see [`TlsConfig::disabled`] for plaintext
    pub fn tls(
        mut self,
        tls: TlsConfig,
    ) -> Self {
        self.tls = tls;
        self
    }

    /// Total time allowed for the initial connect (default: 10s)
    pub fn retry_max_duration(
        mut self,
        budget: Duration,
    ) -> Self {
        self.retry_max_duration = budget;
        self
    }

    /// Delay policy between connect rounds
    pub fn connect_backoff(
        mut self,
        policy: BackoffPolicy,
    ) -> Self {
        self.connect_backoff = policy;
        self
    }

    /// Validates inputs, loads the TLS material and dials the endpoints
    ///
    /// # Errors
    /// - `Error::InvalidConfig` for an empty or malformed endpoint list
    /// - `Error::Connection` when no endpoint could be reached and
    ///   authenticated within the retry budget
    pub async fn connect(self) -> Result<Connection> {
        validate_endpoints(&self.endpoints)?;
        self.network.validate()?;
        self.tls.validate()?;

        let tls = if self.tls.enable_tls {
            let material = TlsMaterial::load(&self.tls).await?;
            Some(material.client_tls_config())
        } else {
            if let Some(endpoint) = self.endpoints.iter().find(|e| e.starts_with("https://")) {
                return Err(Error::InvalidConfig(format!(
                    "endpoint {endpoint} requires TLS but TLS is disabled"
                )));
            }
            None
        };

        let pool = ConnectionPool::create(
            &self.endpoints,
            &self.network,
            tls,
            self.retry_max_duration,
            self.connect_backoff,
        )
        .await?;

        info!("connected to {:?}", pool.endpoints());
        Ok(Connection::new(pool, self.network))
    }
}
