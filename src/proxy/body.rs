//! The request body tap: the retry gate of the forwarding engine.
//!
//! The inbound body is parked in a shared [`BodyTap`] and handed to one
//! upstream attempt at a time through a [`ForwardBody`]. The tap counts every
//! data byte pulled by the HTTP client; once a single byte has gone out, the
//! request can no longer be replayed and the engine must not retry it. An
//! attempt that failed before touching the body hands it back on drop so the
//! next attempt can send it.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};

/// Shared holder of the not-yet-transmitted inbound body.
pub struct BodyTap {
    parked: Mutex<Option<Body>>,
    read: AtomicU64,
}

impl BodyTap {
    pub fn new(body: Body) -> Arc<Self> {
        Arc::new(Self {
            parked: Mutex::new(Some(body)),
            read: AtomicU64::new(0),
        })
    }

    /// Number of body bytes already pulled by an upstream attempt. Non-zero
    /// means the body cannot be replayed.
    pub fn bytes_read(&self) -> u64 {
        self.read.load(Ordering::SeqCst)
    }

    fn park(&self, body: Body) {
        *self.parked.lock().unwrap_or_else(|e| e.into_inner()) = Some(body);
    }

    fn claim(&self) -> Option<Body> {
        self.parked.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// The body given to one upstream attempt. Claims the parked inbound body on
/// first poll and counts the data frames it forwards.
pub struct ForwardBody {
    tap: Arc<BodyTap>,
    inner: Option<Body>,
}

impl ForwardBody {
    pub fn new(tap: Arc<BodyTap>) -> Self {
        Self { tap, inner: None }
    }
}

impl http_body::Body for ForwardBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.inner.is_none() {
            this.inner = this.tap.claim();
        }
        let Some(inner) = this.inner.as_mut() else {
            // The body went out with an earlier attempt; there is nothing
            // left to send.
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.tap.read.fetch_add(data.len() as u64, Ordering::SeqCst);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Some(inner) => inner.is_end_stream(),
            None => self
                .tap
                .parked
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .map(HttpBody::is_end_stream)
                .unwrap_or(true),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Some(inner) => inner.size_hint(),
            None => self
                .tap
                .parked
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .map(HttpBody::size_hint)
                .unwrap_or_else(|| SizeHint::with_exact(0)),
        }
    }
}

impl Drop for ForwardBody {
    fn drop(&mut self) {
        // An attempt that never transmitted a byte parks the body again for
        // the next attempt to claim.
        if let Some(inner) = self.inner.take() {
            if self.tap.bytes_read() == 0 {
                self.tap.park(inner);
            }
        }
    }
}
