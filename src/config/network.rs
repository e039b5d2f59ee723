use std::time::Duration;

use crate::Error;
use crate::Result;

/// Channel parameters shared by every endpoint connection
///
/// Only unary calls are bounded by `request_timeout`; the watch stream is
/// long-lived and relies on HTTP/2 keepalive to detect dead peers.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Maximum time to wait for establishing a TCP connection
    /// Default: 1 second
    pub connect_timeout: Duration,

    /// Maximum time to wait for a unary RPC response
    /// Default: 3 seconds
    pub request_timeout: Duration,

    /// TCP keepalive duration for idle connections
    /// Default: 5 minutes (300s)
    pub tcp_keepalive: Duration,

    /// Interval for HTTP/2 keepalive pings
    /// Default: 30 seconds
    pub http2_keepalive_interval: Duration,

    /// Timeout for HTTP/2 keepalive pings
    /// Default: 10 seconds
    pub http2_keepalive_timeout: Duration,

    /// Enable Gzip compression for requests and responses
    /// Default: false, etcd does not advertise gzip
    pub enable_compression: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1000),
            request_timeout: Duration::from_millis(3000),
            tcp_keepalive: Duration::from_secs(300),
            http2_keepalive_interval: Duration::from_secs(30),
            http2_keepalive_timeout: Duration::from_secs(10),
            enable_compression: false,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::InvalidConfig("connect_timeout must be greater than 0".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidConfig("request_timeout must be greater than 0".into()));
        }
        if self.http2_keepalive_timeout >= self.http2_keepalive_interval {
            return Err(Error::InvalidConfig(format!(
                "http2_keepalive_timeout {:?} must be shorter than http2_keepalive_interval {:?}",
                self.http2_keepalive_timeout, self.http2_keepalive_interval
            )));
        }
        Ok(())
    }
}
