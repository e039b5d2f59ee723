use bytes::Bytes;
use tonic::async_trait;
use tonic::Request;
use tracing::debug;

use super::Connection;
use crate::proto::etcdserverpb::PutRequest;
use crate::KvWriter;
use crate::WriteError;

#[async_trait]
impl KvWriter for Connection {
    /// Single unary `Put`, bounded by the network request timeout
    ///
    /// # Errors
    /// - `WriteError::ConnectionClosed` after [`Connection::close`]
    /// - Status codes mapped through `From<Status> for WriteError`
    async fn put(
        &self,
        key: Bytes,
        value: Bytes,
    ) -> Result<(), WriteError> {
        let mut client = self.kv_client().ok_or(WriteError::ConnectionClosed)?;

        let mut request = Request::new(PutRequest::new(key, value));
        request.set_timeout(self.network().request_timeout);

        let response = client.put(request).await?.into_inner();
        debug!(
            revision = response.header.map(|h| h.revision).unwrap_or_default(),
            "put acknowledged"
        );
        Ok(())
    }
}
