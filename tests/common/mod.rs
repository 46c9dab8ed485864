//! Mock upstream LLM API and proxy launcher shared by the integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use prompt_proxy::{build_router, AppConfig, ProxyState};

/// A request the mock upstream received from the proxy
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub raw_body: String,
    pub body: Value,
}

#[derive(Default)]
struct MockState {
    status: u16,
    chunks: Vec<String>,
    received: Vec<ReceivedRequest>,
    gate: Option<oneshot::Receiver<()>>,
}

type SharedMockState = Arc<Mutex<MockState>>;

/// Upstream that answers every POST with a fixed sequence of body chunks
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: SharedMockState,
}

impl MockUpstream {
    pub async fn start(chunks: &[&str]) -> Self {
        Self::start_with_status(200, chunks).await
    }

    pub async fn start_with_status(status: u16, chunks: &[&str]) -> Self {
        let state: SharedMockState = Arc::new(Mutex::new(MockState {
            status,
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }));

        let app = Router::new()
            .route("/v1/chat/completions", post(handle_completion))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock upstream failed");
        });

        Self { addr, state }
    }

    pub fn endpoint(&self) -> url::Url {
        url::Url::parse(&format!("http://{}/v1/chat/completions", self.addr)).unwrap()
    }

    /// Hold every chunk after the first until the returned sender fires
    pub fn hold_after_first_chunk(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().gate = Some(rx);
        tx
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.state.lock().unwrap().received.clone()
    }

    /// The single request received, panicking if there were zero or several
    pub fn only_request(&self) -> ReceivedRequest {
        let received = self.received();
        assert_eq!(received.len(), 1, "expected exactly one upstream request");
        received.into_iter().next().unwrap()
    }
}

async fn handle_completion(
    State(state): State<SharedMockState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let (status, chunks, gate) = {
        let mut state = state.lock().unwrap();
        state.received.push(ReceivedRequest {
            authorization: header_str(header::AUTHORIZATION),
            content_type: header_str(header::CONTENT_TYPE),
            raw_body: String::from_utf8_lossy(&body).into_owned(),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });
        (state.status, state.chunks.clone(), state.gate.take())
    };

    let stream = futures::stream::unfold((0usize, chunks, gate), |(idx, chunks, mut gate)| async move {
        if idx >= chunks.len() {
            return None;
        }
        if idx == 1 {
            if let Some(rx) = gate.take() {
                let _ = rx.await;
            }
        }
        let chunk = Bytes::from(chunks[idx].clone());
        Some((Ok::<_, std::io::Error>(chunk), (idx + 1, chunks, gate)))
    });

    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Configuration pointing at `upstream` with no rewrites
pub fn config_for(upstream: &MockUpstream) -> AppConfig {
    AppConfig::with_endpoint(upstream.endpoint())
}

/// Serve the proxy router on an ephemeral port
pub async fn start_proxy(config: AppConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(ProxyState::new(config).unwrap());

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Proxy server failed");
    });

    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap()
}

/// POST `body` to the proxy's chat completion route
pub async fn send(proxy: SocketAddr, body: &Value) -> reqwest::Response {
    client()
        .post(format!("http://{}/chat/completions", proxy))
        .json(body)
        .send()
        .await
        .unwrap()
}

/// POST a literal JSON text to the proxy's chat completion route
pub async fn send_raw(proxy: SocketAddr, body: &'static str) -> reqwest::Response {
    client()
        .post(format!("http://{}/chat/completions", proxy))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
}

pub fn chat_request(messages: Value) -> Value {
    json!({
        "model": "client-model",
        "stream": true,
        "temperature": 0.7,
        "max_tokens": 512,
        "messages": messages
    })
}
