//! Progress reporting for streamed transfers
//!
//! Listeners receive the cumulative number of bytes transferred so far,
//! not deltas.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Sink for transfer progress
pub trait ProgressListener: Send + Sync {
    /// Called with the total number of bytes transferred so far
    fn on_progress(&self, bytes: u64);
}

/// Listener that ignores all updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&self, _bytes: u64) {}
}

impl<F> ProgressListener for F
where
    F: Fn(u64) + Send + Sync,
{
    fn on_progress(&self, bytes: u64) {
        self(bytes)
    }
}

/// Shared no-op listener
pub fn no_progress() -> Arc<dyn ProgressListener> {
    Arc::new(NoProgress)
}

/// Reader that reports every consumed byte to a listener
pub struct ProgressReader<R> {
    inner: R,
    listener: Arc<dyn ProgressListener>,
    transferred: u64,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, listener: Arc<dyn ProgressListener>) -> Self {
        Self {
            inner,
            listener,
            transferred: 0,
        }
    }

    /// Bytes read so far
    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = (buf.filled().len() - before) as u64;
            if read > 0 {
                self.transferred += read;
                self.listener.on_progress(self.transferred);
            }
        }
        poll
    }
}
