use std::sync::Arc;

use async_trait::async_trait;

use ca_core::{
    ByteStream, CloudItemList, CloudItemMetadata, CloudPath, CloudProvider, Error, NetworkTimeouts,
    ProgressListener, Result,
};

use crate::client::WebDavClient;
use crate::credential::WebDavCredential;
use crate::http::HttpTransport;
use crate::transport::{WebDavTransport, build_transport};

/// [`CloudProvider`] backed by a WebDAV share
#[derive(Debug)]
pub struct WebDavCloudProvider<T = WebDavTransport> {
    client: WebDavClient<T>,
}

impl WebDavCloudProvider<WebDavTransport> {
    /// Build the provider and verify server and credentials
    ///
    /// Fails with `ServerNotCompatible` when the base URL does not speak
    /// WebDAV and with `Unauthorized` when the credentials are rejected.
    pub async fn connect(credential: &WebDavCredential, timeouts: &NetworkTimeouts) -> Result<Self> {
        let provider = Self::new(build_transport(credential, timeouts)?, credential);

        tracing::debug!(url = %credential.base_url(), "Checking WebDAV server");
        provider.client.check_server_compatibility().await?;
        provider.client.try_authenticated_request().await?;
        tracing::info!(url = %credential.base_url(), user = credential.username(), "Connected to WebDAV server");

        Ok(provider)
    }
}

impl<T: HttpTransport> WebDavCloudProvider<T> {
    /// Wrap an already built transport without probing the server
    pub fn new(transport: T, credential: &WebDavCredential) -> Self {
        Self {
            client: WebDavClient::new(transport, credential.base_url().clone()),
        }
    }

    pub fn client(&self) -> &WebDavClient<T> {
        &self.client
    }
}

#[async_trait]
impl<T: HttpTransport> CloudProvider for WebDavCloudProvider<T> {
    async fn item_metadata(&self, node: &CloudPath) -> Result<CloudItemMetadata> {
        self.client
            .item_metadata(node)
            .await?
            .ok_or_else(|| Error::NotFound(node.to_string()))
    }

    async fn list(&self, folder: &CloudPath, _page_token: Option<&str>) -> Result<CloudItemList> {
        self.client.list(folder).await
    }

    async fn list_exhaustively(&self, folder: &CloudPath) -> Result<CloudItemList> {
        self.client.list_exhaustively(folder).await
    }

    async fn read(&self, file: &CloudPath, listener: Arc<dyn ProgressListener>) -> Result<ByteStream> {
        self.client.read(file, listener).await
    }

    async fn read_range(
        &self,
        file: &CloudPath,
        offset: u64,
        count: u64,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<ByteStream> {
        self.client.read_range(file, offset, count, listener).await
    }

    async fn write(
        &self,
        file: &CloudPath,
        replace: bool,
        data: ByteStream,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<CloudItemMetadata> {
        self.client.write(file, replace, data, listener).await
    }

    async fn create_folder(&self, folder: &CloudPath) -> Result<CloudPath> {
        self.client.create_folder(folder).await
    }

    async fn delete(&self, node: &CloudPath) -> Result<()> {
        self.client.delete(node).await
    }

    async fn move_item(&self, source: &CloudPath, target: &CloudPath, replace: bool) -> Result<CloudPath> {
        self.client.move_item(source, target, replace).await
    }
}
