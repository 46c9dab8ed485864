//! prompt-proxy: streaming reverse proxy for chat completion APIs
//!
//! Features:
//! - Forces a configured model onto every request
//! - Overwrites or extends the system prompt
//! - Relays the upstream response to the caller chunk by chunk

pub mod config;
pub mod proxy;
pub mod request_log;
pub mod rewrite;

pub use config::AppConfig;
pub use proxy::{build_router, run_server, ProxyState};
pub use rewrite::RequestRewriter;
