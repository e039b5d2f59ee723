use std::time::Duration;

use tonic::codegen::http::Uri;

use super::BackoffPolicy;
use crate::constants::DEFAULT_ENDPOINT;
use crate::Error;
use crate::Result;

/// Static store topology, no discovery
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Store member URIs, `http://` or `https://`
    /// Default: `https://127.0.0.1:2379`
    pub endpoints: Vec<String>,

    /// Total time allowed for the initial connect, retries included
    /// Default: 10 seconds
    pub retry_max_duration: Duration,

    /// Delay between connect rounds
    pub connect_backoff: BackoffPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            retry_max_duration: Duration::from_secs(10),
            connect_backoff: BackoffPolicy {
                max_retries: 0,
                timeout_ms: 1000,
                base_delay_ms: 100,
                max_delay_ms: 2000,
            },
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        validate_endpoints(&self.endpoints)?;

        if self.retry_max_duration.is_zero() {
            return Err(Error::InvalidConfig("retry_max_duration must be greater than 0".into()));
        }

        self.connect_backoff.validate("cluster.connect_backoff")
    }
}

/// Every endpoint must be an absolute http(s) URI with an authority
pub(crate) fn validate_endpoints(endpoints: &[String]) -> Result<()> {
    if endpoints.is_empty() {
        return Err(Error::InvalidConfig("at least one endpoint required".into()));
    }

    for endpoint in endpoints {
        let uri: Uri = endpoint
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("invalid endpoint {endpoint:?}: {e}")))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "endpoint {endpoint:?} must use the http or https scheme"
                )))
            }
        }

        if uri.authority().is_none() {
            return Err(Error::InvalidConfig(format!("endpoint {endpoint:?} has no host")));
        }
    }

    Ok(())
}
