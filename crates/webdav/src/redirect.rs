//! Redirect following
//!
//! reqwest's own redirect policy is disabled so that method rewriting and
//! credential stripping follow WebDAV client expectations exactly.

use async_trait::async_trait;
use http::{Method, StatusCode, header};
use url::Url;

use ca_core::{Error, Result};

use crate::http::{DavRequest, DavResponse, HttpTransport, Origin, RequestBody};

/// Maximum number of redirect hops for one logical request
pub const MAX_REDIRECTS: usize = 20;

/// Transport wrapper that transparently follows redirect responses
#[derive(Debug, Clone)]
pub struct RedirectFollower<T> {
    inner: T,
}

impl<T> RedirectFollower<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for RedirectFollower<T> {
    async fn execute(&self, mut request: DavRequest) -> Result<DavResponse> {
        let mut redirects = 0;
        loop {
            let response = self.inner.execute(request.clone()).await?;
            let Some(next) = redirected_request(&request, &response) else {
                return Ok(response);
            };

            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(Error::backend(format!("Too many redirects: {redirects}")));
            }

            tracing::debug!(
                status = response.status.as_u16(),
                from = %request.url,
                to = %next.url,
                method = %next.method,
                "Following redirect"
            );
            request = next;
        }
    }
}

/// The request to issue next, or `None` if `response` is final
fn redirected_request(request: &DavRequest, response: &DavResponse) -> Option<DavRequest> {
    if !is_redirect(response.status) {
        return None;
    }
    let target = redirect_url(&request.url, response)?;

    let mut next = request.clone();
    if matches!(
        response.status,
        StatusCode::MULTIPLE_CHOICES | StatusCode::SEE_OTHER
    ) {
        next.method = Method::GET;
        next.body = RequestBody::empty();
        next.headers.remove(header::TRANSFER_ENCODING);
        next.headers.remove(header::CONTENT_LENGTH);
        next.headers.remove(header::CONTENT_TYPE);
    } else if !request.body.is_replayable() {
        tracing::warn!(
            status = response.status.as_u16(),
            url = %request.url,
            "Not following redirect: the streamed body cannot be resent"
        );
        return None;
    }
    if Origin::of(&request.url) != Origin::of(&target) {
        next.headers.remove(header::AUTHORIZATION);
    }
    next.url = target;
    Some(next)
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MULTIPLE_CHOICES
            | StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn redirect_url(current: &Url, response: &DavResponse) -> Option<Url> {
    let location = response.header_str(header::LOCATION)?;
    match current.join(location) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(location, error = %e, "Ignoring unresolvable redirect location");
            None
        }
    }
}
