//! Response and request-body trackers
//!
//! [`ResponseTracker`] decorates a [`ResponseWriter`] and remembers the status
//! line that was actually written, the bytes written and the last write error.
//! [`BodyTracker`] decorates a request body and remembers the bytes read, read
//! errors and end-of-stream. Either can emit one trace event per message.
//! Neither tracker produces errors of its own.

use crate::handlers::ResponseWriter;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, StatusCode},
};
use bytes::Buf;
use http_body::{Frame, SizeHint};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Per-message trace events emitted by the trackers
///
/// Each body chunk read or written becomes one `TRACE` event on the current
/// span, carrying its size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageEvents {
    pub read: bool,
    pub write: bool,
}

impl MessageEvents {
    pub const NONE: MessageEvents = MessageEvents {
        read: false,
        write: false,
    };

    pub const ALL: MessageEvents = MessageEvents {
        read: true,
        write: true,
    };
}

/// Copy of a write error kept for later inspection
///
/// The original `io::Error` is returned to the writer's caller untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    kind: io::ErrorKind,
    message: String,
}

impl CapturedError {
    pub fn kind(&self) -> io::ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&io::Error> for CapturedError {
    fn from(err: &io::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Decorator recording what a handler wrote to a [`ResponseWriter`]
///
/// Only the first `write_header` call is recorded and forwarded. Writing body
/// bytes before any status line implies `200 OK`.
pub struct ResponseTracker<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
    header_written: bool,
    bytes_written: u64,
    last_error: Option<CapturedError>,
    write_events: bool,
}

impl<'a> ResponseTracker<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: None,
            header_written: false,
            bytes_written: 0,
            last_error: None,
            write_events: false,
        }
    }

    /// Emit a trace event for every body write when `events.write` is set
    pub fn with_events(mut self, events: MessageEvents) -> Self {
        self.write_events = events.write;
        self
    }

    /// Status code of the status line, `None` until one is written
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    /// Body bytes the underlying writer accepted
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Most recent error returned by the underlying writer
    ///
    /// A later successful write does not clear it.
    pub fn last_error(&self) -> Option<&CapturedError> {
        self.last_error.as_ref()
    }
}

#[async_trait]
impl<'a> ResponseWriter for ResponseTracker<'a> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.header_written {
            return;
        }
        self.header_written = true;
        self.status = Some(status);
        self.inner.write_header(status);
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.header_written {
            self.write_header(StatusCode::OK);
        }

        let result = self.inner.write(buf).await;
        match &result {
            Ok(n) => {
                self.bytes_written += *n as u64;
                if self.write_events {
                    tracing::trace!(wrote_bytes = *n, "write");
                }
            }
            Err(e) => {
                self.last_error = Some(CapturedError::from(e));
                if self.write_events {
                    tracing::trace!(error = %e, "write");
                }
            }
        }
        result
    }
}

/// Read outcome shared between a [`BodyTracker`] and its creator
#[derive(Debug, Default)]
pub struct BodyState {
    error: Mutex<Option<String>>,
    finished: AtomicBool,
    bytes_read: AtomicU64,
}

impl BodyState {
    /// Data bytes handed to the body's reader so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Acquire)
    }

    /// Message of the last error returned while reading the body
    pub fn read_error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether the body was read to end-of-stream
    pub fn reached_end(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn record_error(&self, message: String) {
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
    }

    fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    fn add_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::AcqRel);
    }
}

/// Body decorator recording read errors and end-of-stream
///
/// Frames are passed through unchanged. Dropping the tracker drops (closes)
/// the wrapped body.
pub struct BodyTracker<B> {
    inner: B,
    state: Arc<BodyState>,
    read_events: bool,
}

impl<B> BodyTracker<B> {
    pub fn new(inner: B, events: MessageEvents) -> (Self, Arc<BodyState>) {
        let state = Arc::new(BodyState::default());
        (
            Self {
                inner,
                state: Arc::clone(&state),
                read_events: events.read,
            },
            state,
        )
    }
}

impl BodyTracker<Body> {
    /// Replace the body of `request` with a tracked one
    pub fn wrap(request: Request<Body>, events: MessageEvents) -> (Request<Body>, Arc<BodyState>) {
        let (parts, body) = request.into_parts();
        let (tracked, state) = Self::new(body, events);
        (Request::from_parts(parts, Body::new(tracked)), state)
    }
}

impl<B> http_body::Body for BodyTracker<B>
where
    B: http_body::Body + Unpin,
    B::Error: fmt::Display,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);

        match &polled {
            Poll::Ready(None) => this.state.mark_finished(),
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    let n = data.remaining();
                    this.state.add_read(n as u64);
                    if this.read_events {
                        tracing::trace!(read_bytes = n, "read");
                    }
                }
            }
            Poll::Ready(Some(Err(e))) => {
                this.state.record_error(e.to_string());
                if this.read_events {
                    tracing::trace!(error = %e, "read");
                }
            }
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
