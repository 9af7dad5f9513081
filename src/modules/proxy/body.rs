//! Streaming response masking as a body adapter.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use hyper::body::{Body, Frame, Incoming, SizeHint};

use crate::modules::masking::{FieldRule, MaskingWriter};

/// Wraps an upstream response body and rewrites it through the masking
/// scanner chunk by chunk. Output length is unknown up front, so responses
/// carrying this body must not advertise a `Content-Length`.
pub struct MaskingBody {
    inner: Incoming,
    writer: MaskingWriter,
    pending: Option<Frame<Bytes>>,
    done: bool,
}

impl MaskingBody {
    /// Wrap an upstream body with the route's field map at a clearance level.
    #[must_use]
    pub fn new(inner: Incoming, fields: Arc<HashMap<String, FieldRule>>, level: u8) -> Self {
        Self {
            inner,
            writer: MaskingWriter::new(fields, level),
            pending: None,
            done: false,
        }
    }
}

impl Body for MaskingBody {
    type Data = Bytes;
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        loop {
            if let Some(frame) = this.pending.take() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match Pin::new(&mut this.inner).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                    Ok(data) => {
                        let masked = this.writer.process_chunk(&data);
                        // A chunk can be swallowed whole into the value
                        // buffer; poll for more input instead of emitting an
                        // empty frame.
                        if !masked.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(masked))));
                        }
                    }
                    Err(other) => {
                        // Trailers end the data stream: flush the scanner
                        // first, then hand the trailer frame through.
                        this.done = true;
                        let tail = this.writer.finish();
                        if let Ok(trailers) = other.into_trailers() {
                            this.pending = Some(Frame::trailers(trailers));
                        }
                        if !tail.is_empty() {
                            return Poll::Ready(Some(Ok(Frame::data(tail))));
                        }
                    }
                },
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e.into()))),
                Poll::Ready(None) => {
                    this.done = true;
                    let tail = this.writer.finish();
                    if !tail.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(tail))));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done && self.pending.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        // Masking changes the length unpredictably.
        SizeHint::default()
    }
}
