use std::path::PathBuf;
use std::time::Duration;

use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DnType;
use rcgen::ExtendedKeyUsagePurpose;
use rcgen::IsCa;
use rcgen::KeyPair;
use rcgen::KeyUsagePurpose;
use tempfile::TempDir;
use tokio::time::sleep;
use tokio::time::Instant;
use tonic::transport::Certificate;
use tonic::transport::Identity;
use tonic::transport::ServerTlsConfig;

use crate::TlsConfig;

/// Polls `condition` every 10ms until it holds or `within` elapses
pub async fn eventually<F>(
    within: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// CA, server and client certificates minted for one test
///
/// PEM files live in a temp dir removed on drop. The server certificate is
/// valid for `localhost` and `127.0.0.1`.
pub struct TestPki {
    pub dir: TempDir,
    pub ca_pem: String,
    pub server_cert_pem: String,
    pub server_key_pem: String,
    pub client_cert_pem: String,
    pub client_key_pem: String,
}

impl TestPki {
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().expect("generate CA key");
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.distinguished_name.push(DnType::CommonName, "etcd-pulse test CA");
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let ca_cert = ca_params.self_signed(&ca_key).expect("self-sign CA");

        let server_key = KeyPair::generate().expect("generate server key");
        let mut server_params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).expect("server params");
        server_params.distinguished_name.push(DnType::CommonName, "etcd");
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .expect("sign server certificate");

        let client_key = KeyPair::generate().expect("generate client key");
        let mut client_params = CertificateParams::new(vec!["etcd-pulse".to_string()]).expect("client params");
        client_params.distinguished_name.push(DnType::CommonName, "etcd-pulse");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client_cert = client_params
            .signed_by(&client_key, &ca_cert, &ca_key)
            .expect("sign client certificate");

        let pki = Self {
            dir: TempDir::new().expect("create temp dir"),
            ca_pem: ca_cert.pem(),
            server_cert_pem: server_cert.pem(),
            server_key_pem: server_key.serialize_pem(),
            client_cert_pem: client_cert.pem(),
            client_key_pem: client_key.serialize_pem(),
        };
        pki.write("ca.cer", &pki.ca_pem);
        pki.write("etcd.cer", &pki.client_cert_pem);
        pki.write("etcd-pkcs8.pem", &pki.client_key_pem);
        pki
    }

    pub fn write(
        &self,
        name: &str,
        content: &str,
    ) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write PEM file");
        path
    }

    /// Client side settings pointing at the generated files
    pub fn client_tls_config(&self) -> TlsConfig {
        TlsConfig {
            enable_tls: true,
            certificate_authority_root_path: self.dir.path().join("ca.cer"),
            client_certificate_path: self.dir.path().join("etcd.cer"),
            client_private_key_path: self.dir.path().join("etcd-pkcs8.pem"),
            domain_name: Some("localhost".to_string()),
        }
    }

    /// Server side config requiring a client certificate from this CA
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(Identity::from_pem(&self.server_cert_pem, &self.server_key_pem))
            .client_ca_root(Certificate::from_pem(&self.ca_pem))
    }
}
