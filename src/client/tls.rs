use std::path::Path;

use rcgen::KeyPair;
use tonic::transport::Certificate;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Identity;
use tracing::debug;

use crate::ConnectionError;
use crate::TlsConfig;

const PEM_CERTIFICATE_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERTIFICATE_END: &str = "-----END CERTIFICATE-----";

/// PEM material for mutual TLS, read and checked before any dial
pub(crate) struct TlsMaterial {
    ca: String,
    cert: String,
    key: String,
    domain_name: Option<String>,
}

impl TlsMaterial {
    /// Reads the three PEM files named by `config` and checks them
    ///
    /// Any unreadable or malformed file is reported as a TLS failure.
    pub(crate) async fn load(config: &TlsConfig) -> Result<Self, ConnectionError> {
        let material = Self {
            ca: read_pem(&config.certificate_authority_root_path).await?,
            cert: read_pem(&config.client_certificate_path).await?,
            key: read_pem(&config.client_private_key_path).await?,
            domain_name: config.domain_name.clone(),
        };
        material.validate()?;
        debug!("loaded TLS material, CA {:?}", config.certificate_authority_root_path);
        Ok(material)
    }

    /// Certificates are checked by PEM framing only, the full X.509 check is
    /// left to the handshake. The key must parse as PKCS#8.
    pub(crate) fn validate(&self) -> Result<(), ConnectionError> {
        check_certificate_framing("CA certificate", &self.ca)?;
        check_certificate_framing("client certificate", &self.cert)?;
        KeyPair::from_pem(&self.key)
            .map_err(|e| ConnectionError::tls(format!("client private key is not PKCS#8 PEM: {e}")))?;
        Ok(())
    }

    pub(crate) fn client_tls_config(&self) -> ClientTlsConfig {
        let mut config = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(&self.ca))
            .identity(Identity::from_pem(&self.cert, &self.key));
        if let Some(domain) = &self.domain_name {
            config = config.domain_name(domain.clone());
        }
        config
    }
}

async fn read_pem(path: &Path) -> Result<String, ConnectionError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConnectionError::tls(format!("cannot read {}: {e}", path.display())))
}

fn check_certificate_framing(
    what: &str,
    pem: &str,
) -> Result<(), ConnectionError> {
    let begin = pem.find(PEM_CERTIFICATE_BEGIN);
    let end = pem.rfind(PEM_CERTIFICATE_END);
    match (begin, end) {
        (Some(b), Some(e)) if b < e => Ok(()),
        _ => Err(ConnectionError::tls(format!("{what} is not a PEM certificate"))),
    }
}
