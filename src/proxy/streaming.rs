//! Streaming relay of upstream response bodies

use std::pin::Pin;
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Progress of one relayed body
struct Relay<S> {
    upstream: Pin<Box<S>>,
    chunks: usize,
    bytes: usize,
    start: Instant,
    failed: bool,
}

/// Relay `upstream` chunk by chunk
///
/// Every chunk is yielded as soon as it arrives, unchanged and in order. The
/// first upstream error is yielded as an `io::Error` and ends the stream.
pub fn relay_chunks<S, E>(upstream: S, start: Instant) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let relay = Relay {
        upstream: Box::pin(upstream),
        chunks: 0,
        bytes: 0,
        start,
        failed: false,
    };

    futures::stream::unfold(relay, |mut relay| async move {
        if relay.failed {
            return None;
        }

        match relay.upstream.next().await {
            Some(Ok(chunk)) => {
                relay.chunks += 1;
                relay.bytes += chunk.len();
                tracing::trace!(
                    chunk = relay.chunks,
                    size = chunk.len(),
                    "Upstream chunk: {:?}",
                    String::from_utf8_lossy(&chunk)
                );
                Some((Ok(chunk), relay))
            }
            Some(Err(e)) => {
                tracing::error!(
                    error = %e,
                    chunks = relay.chunks,
                    bytes = relay.bytes,
                    "Error reading upstream stream, aborting response"
                );
                relay.failed = true;
                Some((Err(std::io::Error::other(e)), relay))
            }
            None => {
                tracing::debug!(
                    chunks = relay.chunks,
                    bytes = relay.bytes,
                    elapsed_ms = relay.start.elapsed().as_millis() as u64,
                    "Upstream stream finished"
                );
                None
            }
        }
    })
}

/// Turn an upstream response into the caller's streamed response
///
/// The caller always sees `200 application/json`, whatever upstream declared.
pub fn relay_response(upstream: reqwest::Response, start: Instant) -> Response {
    let status = upstream.status();
    if !status.is_success() {
        tracing::warn!(status = %status, "Upstream returned error status, relaying body unchanged");
    }

    let body = Body::from_stream(relay_chunks(upstream.bytes_stream(), start));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("x-accel-buffering", "no")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
