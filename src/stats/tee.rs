//! Response body tee.
//!
//! Forwards every frame to the client unchanged while copying data frames
//! into a bounded buffer. When the upstream body finishes, the buffer is
//! handed to a completion hook exactly once.
//!
//! # Design Decisions
//! - No completion on error or on drop: a client that disconnects early or
//!   an upstream that breaks mid-stream produces no telemetry
//! - Capture is capped; past the cap the copy is discarded but forwarding
//!   continues untouched

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};

/// Called with the captured body once the upstream body ends.
pub type CompletionHook = Box<dyn FnOnce(Bytes) + Send + 'static>;

pub struct StatisticsTee<B> {
    inner: B,
    buffer: BytesMut,
    limit: usize,
    overflowed: bool,
    on_complete: Option<CompletionHook>,
}

impl<B> StatisticsTee<B> {
    pub fn new(inner: B, limit: usize, on_complete: impl FnOnce(Bytes) + Send + 'static) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            limit,
            overflowed: false,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    /// Bytes captured so far.
    pub fn captured(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the body outgrew the capture limit.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    fn capture(&mut self, data: &Bytes) {
        if self.overflowed {
            return;
        }
        if self.buffer.len() + data.len() > self.limit {
            tracing::debug!(limit = self.limit, "Response body exceeds capture limit, skipping statistics");
            self.overflowed = true;
            self.buffer = BytesMut::new();
            return;
        }
        self.buffer.extend_from_slice(data);
    }

    fn complete(&mut self) {
        let Some(hook) = self.on_complete.take() else {
            return;
        };
        if self.overflowed {
            return;
        }
        hook(self.buffer.split().freeze());
    }

    fn abandon(&mut self) {
        self.on_complete = None;
        self.buffer = BytesMut::new();
    }
}

impl<B> Body for StatisticsTee<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.capture(data);
                }
                // hyper stops polling once the inner body reports its end
                if this.inner.is_end_stream() {
                    this.complete();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.abandon();
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for StatisticsTee<B> {
    fn drop(&mut self) {
        if self.on_complete.is_some() {
            tracing::trace!(captured = self.buffer.len(), "Response body dropped before completion");
        }
    }
}
