//! HTTP request/response model shared by the transport layers
//!
//! The protocol client never talks to reqwest directly. It builds a
//! [`DavRequest`] and hands it to an [`HttpTransport`], which lets the
//! redirect follower, the authenticating transport and test doubles be
//! stacked freely.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use http::header::AsHeaderName;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio::io::AsyncReadExt;
use url::Url;

use ca_core::{ByteStream, Error, ProgressListener, Result};

/// Granularity of upload progress updates
pub const UPLOAD_CHUNK_SIZE: usize = 8192;

/// Scheme, host and port of a URL
///
/// Credentials and cached authentication state never cross an origin
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    pub fn of(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: url.host_str().unwrap_or_default().to_ascii_lowercase(),
            port: url.port_or_known_default(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Request body
///
/// In-memory bodies can be resent as often as needed, so a 307/308 redirect
/// or an authentication challenge may replay them. Streamed bodies are read
/// once, while the request is on the wire.
#[derive(Clone, Default)]
pub struct RequestBody {
    source: BodySource,
    progress: Option<Progress>,
}

#[derive(Clone, Default)]
enum BodySource {
    #[default]
    Empty,
    Buffered(Bytes),
    /// Taken by the first send
    Streamed(Arc<Mutex<Option<ByteStream>>>),
}

/// Progress reporting shared by every send of one body
#[derive(Clone)]
struct Progress {
    listener: Arc<dyn ProgressListener>,
    /// Highest count handed to the listener so far
    reported: Arc<AtomicU64>,
}

impl Progress {
    fn new(listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            listener,
            reported: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Only counts above the high-water mark reach the listener
    fn report(&self, sent: u64) {
        if self.reported.fetch_max(sent, Ordering::AcqRel) < sent {
            self.listener.on_progress(sent);
        }
    }
}

impl RequestBody {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            source: BodySource::Buffered(data.into()),
            progress: None,
        }
    }

    /// In-memory body that reports cumulative bytes sent to `listener`
    pub fn with_progress(data: impl Into<Bytes>, listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            source: BodySource::Buffered(data.into()),
            progress: Some(Progress::new(listener)),
        }
    }

    /// One-shot body read from `data` as it is uploaded
    pub fn streamed(data: ByteStream, listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            source: BodySource::Streamed(Arc::new(Mutex::new(Some(data)))),
            progress: Some(Progress::new(listener)),
        }
    }

    /// Buffered content, `None` for a streamed body
    pub fn data(&self) -> Option<&Bytes> {
        match &self.source {
            BodySource::Buffered(data) => Some(data),
            BodySource::Empty | BodySource::Streamed(_) => None,
        }
    }

    /// Exact length when known up front
    pub fn len(&self) -> Option<u64> {
        match &self.source {
            BodySource::Empty => Some(0),
            BodySource::Buffered(data) => Some(data.len() as u64),
            BodySource::Streamed(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Whether the body can be sent again after a first attempt
    pub fn is_replayable(&self) -> bool {
        !matches!(self.source, BodySource::Streamed(_))
    }

    pub fn has_progress(&self) -> bool {
        self.progress.is_some()
    }

    /// Split into upload chunks of [`UPLOAD_CHUNK_SIZE`] bytes, notifying the
    /// listener as each one is taken
    ///
    /// Fails for a streamed body whose content was already handed out.
    pub fn into_chunks(self) -> Result<BoxStream<'static, io::Result<Bytes>>> {
        let progress = self.progress;
        match self.source {
            BodySource::Empty => Ok(stream::empty().boxed()),
            BodySource::Buffered(data) => {
                let chunks: Vec<Bytes> = (0..data.len())
                    .step_by(UPLOAD_CHUNK_SIZE)
                    .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
                    .collect();

                let mut sent = 0u64;
                Ok(stream::iter(chunks)
                    .map(move |chunk| {
                        sent += chunk.len() as u64;
                        if let Some(progress) = &progress {
                            progress.report(sent);
                        }
                        Ok(chunk)
                    })
                    .boxed())
            }
            BodySource::Streamed(slot) => {
                let reader = slot
                    .lock()
                    .map_err(|_| Error::backend("request body lock poisoned"))?
                    .take()
                    .ok_or_else(|| {
                        Error::backend("Streamed request body was already sent and cannot be replayed")
                    })?;
                Ok(read_chunks(reader, progress))
            }
        }
    }
}

/// Chunk a reader into full [`UPLOAD_CHUNK_SIZE`] pieces; only the last may be short
fn read_chunks(
    reader: ByteStream,
    progress: Option<Progress>,
) -> BoxStream<'static, io::Result<Bytes>> {
    stream::try_unfold((reader, 0u64), move |(mut reader, sent)| {
        let progress = progress.clone();
        async move {
            let mut chunk = BytesMut::zeroed(UPLOAD_CHUNK_SIZE);
            let mut filled = 0;
            while filled < UPLOAD_CHUNK_SIZE {
                let n = reader.read(&mut chunk[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                return Ok(None);
            }
            chunk.truncate(filled);

            let sent = sent + filled as u64;
            if let Some(progress) = &progress {
                progress.report(sent);
            }
            Ok::<_, io::Error>(Some((chunk.freeze(), (reader, sent))))
        }
    })
    .boxed()
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBody")
            .field("len", &self.len())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// One HTTP request as seen by the transport stack
#[derive(Debug, Clone)]
pub struct DavRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl DavRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::empty(),
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Header value as text, `None` when absent or not visible ASCII
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Streamed response body
pub struct ResponseBody(BoxStream<'static, Result<Bytes>>);

impl ResponseBody {
    pub fn empty() -> Self {
        Self(stream::empty().boxed())
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if data.is_empty() {
            return Self::empty();
        }
        Self(stream::once(async move { Ok(data) }).boxed())
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self(stream.boxed())
    }

    /// Drain the whole body into memory
    pub async fn bytes(self) -> Result<Bytes> {
        let mut stream = self.0;
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
        self.0
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody { .. }")
    }
}

/// One HTTP response; `url` is the URL of the request that produced it
#[derive(Debug)]
pub struct DavResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: Url,
    pub body: ResponseBody,
}

impl DavResponse {
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url,
            body: ResponseBody::empty(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Executes a single HTTP exchange
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: DavRequest) -> Result<DavResponse>;
}

/// Parse a WebDAV extension method such as `PROPFIND`
pub(crate) fn dav_method(name: &'static str) -> Result<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| Error::backend(format!("invalid HTTP method {name}: {e}")))
}

/// Header value from dynamic text such as a URL or a byte range
pub(crate) fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::backend(format!("invalid header value '{value}': {e}")))
}
