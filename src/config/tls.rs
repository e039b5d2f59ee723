use std::path::PathBuf;

use crate::constants::DEFAULT_CA_CERTIFICATE_PATH;
use crate::constants::DEFAULT_CLIENT_CERTIFICATE_PATH;
use crate::constants::DEFAULT_CLIENT_PRIVATE_KEY_PATH;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Enables mutual TLS towards the store
    /// Default: true
    pub enable_tls: bool,

    /// Path to the Certificate Authority root certificate (PEM)
    /// Default: "certs/ca.cer"
    pub certificate_authority_root_path: PathBuf,

    /// Client certificate chain path (PEM)
    /// Default: "certs/etcd.cer"
    pub client_certificate_path: PathBuf,

    /// Client private key path, PKCS#8 PEM
    /// Default: "certs/etcd-pkcs8.pem"
    pub client_private_key_path: PathBuf,

    /// Overrides the server name checked against the store certificate
    /// Default: None, the endpoint host is used
    pub domain_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enable_tls: true,
            certificate_authority_root_path: PathBuf::from(DEFAULT_CA_CERTIFICATE_PATH),
            client_certificate_path: PathBuf::from(DEFAULT_CLIENT_CERTIFICATE_PATH),
            client_private_key_path: PathBuf::from(DEFAULT_CLIENT_PRIVATE_KEY_PATH),
            domain_name: None,
        }
    }
}

impl TlsConfig {
    /// Plaintext configuration, for stores without TLS
    pub fn disabled() -> Self {
        Self {
            enable_tls: false,
            ..Default::default()
        }
    }

    /// Only checks that paths are present; the material itself is checked
    /// when the connection is built
    pub fn validate(&self) -> Result<()> {
        if !self.enable_tls {
            return Ok(());
        }

        for (name, path) in [
            ("certificate_authority_root_path", &self.certificate_authority_root_path),
            ("client_certificate_path", &self.client_certificate_path),
            ("client_private_key_path", &self.client_private_key_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(format!("tls.{name} cannot be empty")));
            }
        }

        if let Some(domain) = &self.domain_name {
            if domain.trim().is_empty() {
                return Err(Error::InvalidConfig("tls.domain_name cannot be blank".into()));
            }
        }

        Ok(())
    }
}
