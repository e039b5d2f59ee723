// -
// Store defaults

/// Key used both as the watch prefix and as the publisher's write target
pub const DEFAULT_KEY: &str = "test";

pub(crate) const DEFAULT_ENDPOINT: &str = "https://127.0.0.1:2379";

/// Certificate material, PEM encoded. The private key must be PKCS#8.
pub(crate) const DEFAULT_CA_CERTIFICATE_PATH: &str = "certs/ca.cer";
pub(crate) const DEFAULT_CLIENT_CERTIFICATE_PATH: &str = "certs/etcd.cer";
pub(crate) const DEFAULT_CLIENT_PRIVATE_KEY_PATH: &str = "certs/etcd-pkcs8.pem";

// -
// Watch stream

/// Outbound watch requests are rare (create, cancel), a tiny buffer is enough
pub(crate) const WATCH_REQUEST_BUFFER: usize = 4;
