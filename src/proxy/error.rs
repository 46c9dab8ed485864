//! Request-level errors and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::rewrite::RewriteError;

/// Failure of a single proxied request before any upstream byte was relayed
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to read request body: {0}")]
    ReadBody(#[source] axum::Error),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid chat request: {0}")]
    InvalidRequest(#[from] RewriteError),

    #[error("Failed to reach upstream: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ProxyError {
    /// Classify a body read failure, separating the size cap from I/O errors
    pub fn from_body_error(err: axum::Error, limit: usize) -> Self {
        let over_limit = std::error::Error::source(&err)
            .is_some_and(|source| source.is::<http_body_util::LengthLimitError>());

        if over_limit {
            ProxyError::PayloadTooLarge { limit }
        } else {
            ProxyError::ReadBody(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ReadBody(_) | ProxyError::InvalidJson(_) | ProxyError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ProxyError::Upstream(_) => "upstream_error",
            _ => "invalid_request_error",
        }
    }
}

/// OpenAI-style error body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    r#type: &'static str,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: self.error_type(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
