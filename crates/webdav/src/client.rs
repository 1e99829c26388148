//! WebDAV protocol client
//!
//! Translates storage operations into WebDAV requests against a base URL and
//! maps the responses onto the shared metadata and error types.

use std::borrow::Cow;
use std::sync::Arc;

use futures::TryStreamExt;
use http::{HeaderName, HeaderValue, Method, StatusCode, header};
use tokio_util::io::StreamReader;
use url::Url;

use ca_core::{
    ByteStream, CloudItemList, CloudItemMetadata, CloudPath, Error, ProgressListener, ProgressReader,
    Result,
};

use crate::http::{DavRequest, DavResponse, HttpTransport, RequestBody, dav_method, header_value};
use crate::propfind::{PROPFIND_BODY, PropfindDepth, PropfindEntry, PropfindListing, parse_multistatus};

const DEPTH: HeaderName = HeaderName::from_static("depth");
const DESTINATION: HeaderName = HeaderName::from_static("destination");
const OVERWRITE: HeaderName = HeaderName::from_static("overwrite");

/// WebDAV client bound to one share
///
/// Virtual paths are resolved below the base URL path: with a base of
/// `https://host/remote.php/webdav`, `/Documents/a.txt` is requested as
/// `https://host/remote.php/webdav/Documents/a.txt` and hrefs coming back are
/// turned into virtual paths the same way in reverse.
#[derive(Debug)]
pub struct WebDavClient<T> {
    transport: T,
    base_url: Url,
    /// Decoded segments of the base URL path
    base_segments: Vec<String>,
}

impl<T: HttpTransport> WebDavClient<T> {
    pub fn new(transport: T, base_url: Url) -> Self {
        let base_segments = base_url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).map(decode_segment).collect())
            .unwrap_or_default();
        Self {
            transport,
            base_url,
            base_segments,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Metadata of `path`, `None` when the server reported no usable entry
    pub async fn item_metadata(&self, path: &CloudPath) -> Result<Option<CloudItemMetadata>> {
        let (url, listing) = self.propfind(path, PropfindDepth::Zero).await?;
        match listing.node() {
            Some(entry) => self.to_metadata(entry, &url),
            None => Ok(None),
        }
    }

    /// Immediate children of `folder`
    pub async fn list(&self, folder: &CloudPath) -> Result<CloudItemList> {
        self.list_with_depth(folder, PropfindDepth::One).await
    }

    /// All descendants of `folder`, shallowest first
    pub async fn list_exhaustively(&self, folder: &CloudPath) -> Result<CloudItemList> {
        self.list_with_depth(folder, PropfindDepth::Infinity).await
    }

    pub async fn read(&self, path: &CloudPath, listener: Arc<dyn ProgressListener>) -> Result<ByteStream> {
        let request = DavRequest::new(Method::GET, self.absolute_url(path)?);
        self.read_request(path, request, listener).await
    }

    /// Read `count` bytes starting at `offset`
    pub async fn read_range(
        &self,
        path: &CloudPath,
        offset: u64,
        count: u64,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<ByteStream> {
        if count == 0 {
            return Ok(Box::pin(tokio::io::empty()));
        }
        let last = offset.saturating_add(count - 1);
        let request = DavRequest::new(Method::GET, self.absolute_url(path)?)
            .header(header::RANGE, header_value(&format!("bytes={offset}-{last}"))?);
        self.read_request(path, request, listener).await
    }

    /// Upload `data` to `path` and return the stored node's metadata
    pub async fn write(
        &self,
        path: &CloudPath,
        replace: bool,
        data: ByteStream,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<CloudItemMetadata> {
        if !replace && self.exists(path).await? {
            return Err(Error::AlreadyExists(path.to_string()));
        }

        tracing::debug!(path = %path, replace, "Uploading file");
        let request = DavRequest::new(Method::PUT, self.absolute_url(path)?)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .body(RequestBody::streamed(data, listener));
        let response = self.transport.execute(request).await?;
        check_status(response.status, path)?;

        self.item_metadata(path)
            .await?
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    pub async fn create_folder(&self, path: &CloudPath) -> Result<CloudPath> {
        let request = DavRequest::new(dav_method("MKCOL")?, self.absolute_url(path)?);
        let response = self.transport.execute(request).await?;
        check_status(response.status, path)?;
        Ok(path.clone())
    }

    /// Delete a file or, recursively, a folder
    pub async fn delete(&self, path: &CloudPath) -> Result<()> {
        let request = DavRequest::new(Method::DELETE, self.absolute_url(path)?);
        let response = self.transport.execute(request).await?;
        check_status(response.status, path)
    }

    pub async fn move_item(&self, from: &CloudPath, to: &CloudPath, replace: bool) -> Result<CloudPath> {
        let destination = self.absolute_url(to)?;
        let mut request = DavRequest::new(dav_method("MOVE")?, self.absolute_url(from)?)
            .header(DESTINATION, header_value(destination.as_str())?)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/xml"))
            .header(DEPTH, HeaderValue::from_static("infinity"));
        if !replace {
            request = request.header(OVERWRITE, HeaderValue::from_static("F"));
        }

        let response = self.transport.execute(request).await?;
        if response.status == StatusCode::PRECONDITION_FAILED {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        check_status(response.status, from)?;
        Ok(to.clone())
    }

    /// Verify that the base URL answers OPTIONS with a `DAV` header
    pub async fn check_server_compatibility(&self) -> Result<()> {
        let request = DavRequest::new(Method::OPTIONS, self.base_url.clone());
        let response = self.transport.execute(request).await?;
        check_status(response.status, &CloudPath::root())?;

        if !response.headers.contains_key("dav") {
            return Err(Error::ServerNotCompatible(format!(
                "{} did not announce WebDAV support",
                self.base_url
            )));
        }
        Ok(())
    }

    /// Surface credential problems on their own
    ///
    /// Only `Unauthorized` is reported; every other failure of the check is
    /// ignored here and left for the real operations to report.
    pub async fn try_authenticated_request(&self) -> Result<()> {
        match self.item_metadata(&CloudPath::root()).await {
            Err(Error::Unauthorized) => Err(Error::Unauthorized),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring non-authentication failure of server check");
                Ok(())
            }
            Ok(_) => Ok(()),
        }
    }

    async fn exists(&self, path: &CloudPath) -> Result<bool> {
        match self.item_metadata(path).await {
            Ok(metadata) => Ok(metadata.is_some()),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_with_depth(&self, folder: &CloudPath, depth: PropfindDepth) -> Result<CloudItemList> {
        let (url, listing) = self.propfind(folder, depth).await?;

        let items = listing
            .children()
            .iter()
            .filter_map(|entry| match self.to_metadata(entry, &url) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(href = %entry.href, error = %e, "Skipping listing entry");
                    None
                }
            })
            .collect();
        Ok(CloudItemList::new(items))
    }

    async fn propfind(&self, path: &CloudPath, depth: PropfindDepth) -> Result<(Url, PropfindListing)> {
        let request = DavRequest::new(dav_method("PROPFIND")?, self.absolute_url(path)?)
            .header(DEPTH, HeaderValue::from_static(depth.as_str()))
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/xml"))
            .body(RequestBody::bytes(PROPFIND_BODY));

        let response = self.transport.execute(request).await?;
        check_status(response.status, path)?;

        // hrefs resolve against the URL that finally answered, after redirects
        let DavResponse { url: response_url, body, .. } = response;
        let body = body.bytes().await?;
        let entries = parse_multistatus(&body)?;
        tracing::trace!(path = %path, depth = depth.as_str(), entries = entries.len(), "PROPFIND parsed");

        Ok((response_url, PropfindListing::new(entries)))
    }

    async fn read_request(
        &self,
        path: &CloudPath,
        request: DavRequest,
        listener: Arc<dyn ProgressListener>,
    ) -> Result<ByteStream> {
        let response = self.transport.execute(request).await?;
        check_status(response.status, path)?;

        let stream = response.body.into_stream().map_err(std::io::Error::other);
        Ok(Box::pin(ProgressReader::new(StreamReader::new(stream), listener)))
    }

    /// Request URL of a virtual path, with every segment percent-encoded
    fn absolute_url(&self, path: &CloudPath) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config(format!("'{}' cannot be used as a base URL", self.base_url)))?;
            segments.pop_if_empty();
            if path.is_root() {
                segments.push("");
            } else {
                segments.extend(path.segments());
            }
        }
        Ok(url)
    }

    /// Metadata for one PROPFIND entry, `None` when its href lies outside the base URL
    fn to_metadata(&self, entry: &PropfindEntry, request_url: &Url) -> Result<Option<CloudItemMetadata>> {
        let href_path = match entry.resolve(request_url) {
            Some(url) => Cow::Owned(url.path().to_string()),
            None => Cow::Borrowed(entry.href_path()),
        };
        let segments: Vec<String> = href_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect();

        let Some(relative) = segments.strip_prefix(self.base_segments.as_slice()) else {
            tracing::warn!(href = %entry.href, base = %self.base_url, "Skipping href outside of base URL");
            return Ok(None);
        };

        let name = segments.last().cloned().unwrap_or_default();
        let path = CloudPath::from_segments(relative)?;
        let metadata = if entry.is_collection {
            CloudItemMetadata::folder(name, path)
        } else {
            CloudItemMetadata::file(name, path)
        };
        Ok(Some(
            metadata
                .with_size(entry.size)
                .with_last_modified(entry.last_modified),
        ))
    }
}

/// Map an HTTP status onto the error taxonomy
pub(crate) fn check_status(status: StatusCode, path: &CloudPath) -> Result<()> {
    match status.as_u16() {
        200..=299 => Ok(()),
        401 => Err(Error::Unauthorized),
        403 => Err(Error::Forbidden),
        404 | 409 => Err(Error::NotFound(path.to_string())),
        507 => Err(Error::InsufficientStorage),
        code => Err(Error::status(code)),
    }
}

fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes())).into_owned(),
    }
}
