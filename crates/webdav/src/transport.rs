//! reqwest-backed transport
//!
//! [`AuthenticatingTransport`] performs exactly one HTTP exchange plus, on a
//! 401, at most one retry with credentials. Redirects are handled one layer up
//! by [`RedirectFollower`].

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use http::{HeaderValue, StatusCode, header};
use tokio::time::Instant;

use ca_core::{Error, NetworkTimeouts, Result};

use crate::auth::Authenticator;
use crate::credential::WebDavCredential;
use crate::http::{DavRequest, DavResponse, HttpTransport, ResponseBody};
use crate::redirect::RedirectFollower;

/// Full transport stack used by the provider
pub type WebDavTransport = RedirectFollower<AuthenticatingTransport>;

/// Build the transport stack for `credential`
pub fn build_transport(credential: &WebDavCredential, timeouts: &NetworkTimeouts) -> Result<WebDavTransport> {
    Ok(RedirectFollower::new(AuthenticatingTransport::new(credential, timeouts)?))
}

/// Single-exchange HTTP transport that answers authentication challenges
#[derive(Debug)]
pub struct AuthenticatingTransport {
    client: reqwest::Client,
    authenticator: Authenticator,
    timeouts: NetworkTimeouts,
}

impl AuthenticatingTransport {
    pub fn new(credential: &WebDavCredential, timeouts: &NetworkTimeouts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect())
            .read_timeout(timeouts.read())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::backend(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            authenticator: Authenticator::new(credential),
            timeouts: *timeouts,
        })
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    async fn send(&self, request: &DavRequest, authorization: Option<HeaderValue>) -> Result<reqwest::Response> {
        let mut headers = request.headers.clone();
        if let Some(value) = authorization {
            headers.insert(header::AUTHORIZATION, value);
        }

        let builder = self.client.request(request.method.clone(), request.url.clone());

        if request.body.is_empty() {
            return builder.headers(headers).send().await.map_err(transport_error);
        }

        // streamed bodies go out chunked
        if let Some(len) = request.body.len() {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }

        let watch = Arc::new(UploadWatch::new(request.body.len()));
        let chunks = watch.clone().observe(request.body.clone().into_chunks()?);
        let send = builder
            .headers(headers)
            .body(reqwest::Body::wrap_stream(chunks))
            .send();
        self.await_upload(send, &watch).await
    }

    /// Drive `send`, failing once no body chunk has gone out for the write timeout
    ///
    /// After the last chunk the response head is bounded by the read timeout only.
    async fn await_upload<F>(&self, send: F, watch: &UploadWatch) -> Result<reqwest::Response>
    where
        F: Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let write = self.timeouts.write();
        tokio::pin!(send);
        loop {
            tokio::select! {
                result = &mut send => return result.map_err(transport_error),
                _ = tokio::time::sleep_until(watch.idle_deadline(write)) => {
                    if watch.is_finished() {
                        return send.await.map_err(transport_error);
                    }
                    if watch.idle_deadline(write) <= Instant::now() {
                        return Err(Error::backend(format!(
                            "Request timed out: no body data sent for {}s",
                            self.timeouts.write_secs
                        )));
                    }
                }
            }
        }
    }
}

/// Tracks when an upload last handed a chunk to the connection
#[derive(Debug)]
struct UploadWatch {
    started: Instant,
    /// Milliseconds after `started` of the latest chunk
    last_chunk_ms: AtomicU64,
    sent: AtomicU64,
    /// Body length when known; reaching it ends the upload
    expected: Option<u64>,
    finished: AtomicBool,
}

impl UploadWatch {
    fn new(expected: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            last_chunk_ms: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            expected,
            finished: AtomicBool::new(false),
        }
    }

    fn touch(&self, len: usize) {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_chunk_ms.store(elapsed, Ordering::Release);

        let sent = self.sent.fetch_add(len as u64, Ordering::AcqRel) + len as u64;
        if self.expected == Some(sent) {
            self.finish();
        }
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn idle_deadline(&self, budget: Duration) -> Instant {
        self.started + Duration::from_millis(self.last_chunk_ms.load(Ordering::Acquire)) + budget
    }

    /// Record activity on every chunk pulled from `chunks`, and the end of the body
    fn observe(
        self: Arc<Self>,
        chunks: BoxStream<'static, io::Result<Bytes>>,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let done = self.clone();
        chunks
            .inspect(move |chunk| {
                if let Ok(chunk) = chunk {
                    self.touch(chunk.len());
                }
            })
            .chain(stream::poll_fn(move |_| {
                done.finish();
                Poll::Ready(None)
            }))
    }
}

#[async_trait]
impl HttpTransport for AuthenticatingTransport {
    async fn execute(&self, request: DavRequest) -> Result<DavResponse> {
        let caller_authorized = request.headers.contains_key(header::AUTHORIZATION);
        let preemptive = if caller_authorized {
            None
        } else {
            self.authenticator.cached_authorization(&request)
        };

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            body_len = ?request.body.len(),
            authenticated = preemptive.is_some(),
            "Sending request"
        );
        let mut response = self.send(&request, preemptive.clone()).await?;

        if response.status() == StatusCode::UNAUTHORIZED && !caller_authorized {
            match self.authenticator.respond_to_challenge(&request, response.headers()) {
                Some(authorization) if Some(&authorization) != preemptive.as_ref() => {
                    if request.body.is_replayable() {
                        tracing::debug!(url = %request.url, "Retrying with credentials");
                        response = self.send(&request, Some(authorization)).await?;
                    } else {
                        tracing::warn!(
                            url = %request.url,
                            "Authentication required but the streamed body cannot be resent"
                        );
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = response.status().as_u16(),
            "Received response"
        );
        Ok(into_dav_response(response))
    }
}

fn into_dav_response(response: reqwest::Response) -> DavResponse {
    let status = response.status();
    let headers = response.headers().clone();
    let url = response.url().clone();
    let body = ResponseBody::from_stream(response.bytes_stream().map_err(transport_error));

    DavResponse {
        status,
        headers,
        url,
        body,
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::backend(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        Error::backend(format!("Connection failed: {e}"))
    } else {
        Error::backend(format!("HTTP transport error: {e}"))
    }
}
