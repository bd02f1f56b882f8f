//! Streaming [`ResponseWriter`] backed by channels
//!
//! The status line and headers travel over a oneshot channel, body chunks over
//! a bounded mpsc channel. [`PendingResponse`] waits for the status line and
//! then turns the chunk receiver into a streaming response body.

use super::ResponseWriter;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{SinkExt, channel::mpsc};
use std::io;
use tokio::sync::oneshot;

struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

/// Writer half of a streamed response
pub struct StreamingWriter {
    headers: HeaderMap,
    head: Option<oneshot::Sender<Head>>,
    body: mpsc::Sender<io::Result<Bytes>>,
}

/// Receiver half of a streamed response
pub struct PendingResponse {
    head: oneshot::Receiver<Head>,
    body: mpsc::Receiver<io::Result<Bytes>>,
}

impl StreamingWriter {
    /// Create a connected writer/response pair buffering up to `capacity` chunks
    pub fn channel(capacity: usize) -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(capacity);

        (
            Self {
                headers: HeaderMap::new(),
                head: Some(head_tx),
                body: body_tx,
            },
            PendingResponse {
                head: head_rx,
                body: body_rx,
            },
        )
    }

    /// Whether the status line has been written
    pub fn head_written(&self) -> bool {
        self.head.is_none()
    }

    /// Complete the response
    ///
    /// Writes `200 OK` if the handler never wrote a status line, then closes
    /// the body stream.
    pub fn finish(mut self) {
        if !self.head_written() {
            self.write_header(StatusCode::OK);
        }
    }
}

#[async_trait]
impl ResponseWriter for StreamingWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        let Some(head) = self.head.take() else {
            tracing::debug!(status = %status, "Superfluous write_header call ignored");
            return;
        };

        let headers = std::mem::take(&mut self.headers);
        if head.send(Head { status, headers }).is_err() {
            tracing::debug!(
                status = %status,
                "Response receiver dropped before the status line was written"
            );
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.head_written() {
            self.write_header(StatusCode::OK);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        self.body
            .send(Ok(Bytes::copy_from_slice(buf)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "client disconnected before the response body was written",
                )
            })?;
        Ok(buf.len())
    }
}

impl PendingResponse {
    /// Wait for the status line and build a response streaming the body
    ///
    /// Yields `500 Internal Server Error` if the writer was dropped without
    /// writing a status line, which only happens when the handler task panics.
    pub async fn into_response(self) -> Response {
        match self.head.await {
            Ok(head) => {
                let mut response = Response::new(Body::from_stream(self.body));
                *response.status_mut() = head.status;
                *response.headers_mut() = head.headers;
                response
            }
            Err(_) => {
                tracing::error!("Handler terminated without writing a response");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header::CONTENT_TYPE};

    async fn collect(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_write_before_header_sends_ok() {
        let (mut writer, pending) = StreamingWriter::channel(4);

        writer.write(b"body").await.unwrap();
        assert!(writer.head_written());
        writer.finish();

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(collect(response).await, b"body");
    }

    #[tokio::test]
    async fn test_second_write_header_is_ignored() {
        let (mut writer, pending) = StreamingWriter::channel(4);

        writer.write_header(StatusCode::CREATED);
        writer.write_header(StatusCode::BAD_REQUEST);
        writer.finish();

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_headers_after_status_line_are_dropped() {
        let (mut writer, pending) = StreamingWriter::channel(4);

        writer
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        writer.write_header(StatusCode::OK);
        writer
            .headers_mut()
            .insert("x-late", HeaderValue::from_static("1"));
        writer.finish();

        let response = pending.into_response().await;
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
        assert!(response.headers().get("x-late").is_none());
    }

    #[tokio::test]
    async fn test_write_after_client_drop_is_broken_pipe() {
        let (mut writer, pending) = StreamingWriter::channel(4);
        drop(pending);

        let err = writer.write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_empty_write_is_accepted() {
        let (mut writer, pending) = StreamingWriter::channel(4);
        assert_eq!(writer.write(b"").await.unwrap(), 0);
        writer.finish();

        let response = pending.into_response().await;
        assert!(collect(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_writer_yields_internal_error() {
        let (writer, pending) = StreamingWriter::channel(4);
        drop(writer);

        let response = pending.into_response().await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
