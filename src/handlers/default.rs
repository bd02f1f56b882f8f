//! Default request handler
//!
//! Answers every request with the plain-text body `default`.

use super::{Handler, ResponseWriter};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, header::CONTENT_TYPE},
};

/// Body written by [`DefaultHandler`]
pub const DEFAULT_BODY: &[u8] = b"default";

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandler;

#[async_trait]
impl Handler for DefaultHandler {
    async fn handle(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        writer.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        if let Err(e) = writer.write(DEFAULT_BODY).await {
            tracing::debug!(
                error = %e,
                method = %request.method(),
                uri = %request.uri(),
                "Failed to write default response"
            );
        }
    }
}
