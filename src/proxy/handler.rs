//! Chat completion request handler

use axum::{
    body::{to_bytes, Body},
    http::Request,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::time::Instant;

use super::error::ProxyError;
use super::server::ProxyState;
use super::streaming::relay_response;
use crate::request_log::{first_user_message_preview, format_request_log};

/// Largest inbound body accepted
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Proxy request handler
pub struct ProxyHandler {
    state: ProxyState,
}

impl ProxyHandler {
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Handle an incoming chat completion request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let start = Instant::now();

        match self.forward(req, start).await {
            Ok(response) => response,
            Err(e) => {
                if e.status().is_client_error() {
                    tracing::warn!(error = %e, "Rejected chat completion request");
                } else {
                    tracing::error!(error = %e, "Chat completion request failed");
                }
                e.into_response()
            }
        }
    }

    /// Parse, rewrite, send upstream, and hand back the relaying response
    async fn forward(&self, req: Request<Body>, start: Instant) -> Result<Response, ProxyError> {
        let body_bytes = read_body(req.into_body(), MAX_BODY_BYTES).await?;

        let mut request_json: serde_json::Value = serde_json::from_slice(&body_bytes)?;
        let summary = self.state.rewriter.rewrite(&mut request_json)?;

        tracing::info!("{}", format_request_log(&request_json, &summary));
        if let Some(preview) = first_user_message_preview(&request_json) {
            tracing::debug!(first_user_message = %preview, "Request content");
        }

        let upstream_response = self.upstream_request(&request_json).send().await?;

        tracing::debug!(
            status = %upstream_response.status(),
            headers = ?upstream_response.headers(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upstream responded, streaming body"
        );

        Ok(relay_response(upstream_response, start))
    }

    /// Build the upstream POST for an already rewritten body
    fn upstream_request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let upstream = &self.state.config.upstream;

        let mut request = self
            .state
            .http_client
            .post(upstream.endpoint.clone())
            .json(body);

        if let Some(ref api_key) = upstream.api_key {
            request = request.bearer_auth(api_key);
        }

        request
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    to_bytes(body, limit)
        .await
        .map_err(|e| ProxyError::from_body_error(e, limit))
}
