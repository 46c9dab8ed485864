//! HTTP proxy server

mod error;
mod handler;
pub mod server;
mod streaming;

pub use error::ProxyError;
pub use handler::ProxyHandler;
pub use server::{build_router, run_server, serve, ProxyState};
pub use streaming::relay_chunks;
