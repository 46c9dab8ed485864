mod loader;

use std::fmt;

use url::Url;

pub use loader::{load_config, load_config_with};

/// Environment variable holding the upstream chat completion URL
pub const ENV_ENDPOINT: &str = "LLM_API_ENDPOINT";
pub const ENV_DEFAULT_MODEL: &str = "DEFAULT_MODEL";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_OVERWRITE_SYSTEM_PROMPT: &str = "OVERWRITE_SYSTEM_PROMPT";
pub const ENV_APPEND_SYSTEM_PROMPT: &str = "APPEND_SYSTEM_PROMPT";
pub const ENV_TIMEOUT_SECONDS: &str = "UPSTREAM_TIMEOUT_SECONDS";
pub const ENV_POOL_MAX_IDLE: &str = "UPSTREAM_POOL_MAX_IDLE";

/// Main application configuration
///
/// Built once at startup and shared read-only with every request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub prompts: PromptConfig,
}

/// Proxy listen address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4242
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Returns `host:port` suitable for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream LLM API configuration
#[derive(Clone)]
pub struct UpstreamConfig {
    /// Full chat completion URL (e.g., "https://api.example.com/v1/chat/completions")
    pub endpoint: Url,
    /// Model name forced onto every forwarded request
    pub default_model: Option<String>,
    /// Bearer token for upstream authentication
    pub api_key: Option<String>,
    /// Total request timeout; `None` waits as long as upstream keeps the stream open
    pub timeout_seconds: Option<u64>,
    /// Idle keep-alive connections kept per upstream host
    pub pool_max_idle_per_host: usize,
}

pub(crate) fn default_pool_max_idle() -> usize {
    10
}

impl UpstreamConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            default_model: None,
            api_key: None,
            timeout_seconds: None,
            pool_max_idle_per_host: default_pool_max_idle(),
        }
    }

    /// Returns true if the endpoint uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.endpoint.scheme() == "https"
    }
}

// The API key must never reach the logs.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("default_model", &self.default_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .finish()
    }
}

/// System prompt rewriting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptConfig {
    /// Replaces the leading system message, or is prepended as one
    pub overwrite_system_prompt: Option<String>,
    /// Appended to the first message when no overwrite is configured
    pub append_system_prompt: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        load_config()
    }

    /// Configuration with only the endpoint set; everything else at defaults
    pub fn with_endpoint(endpoint: Url) -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::new(endpoint),
            prompts: PromptConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid URL in {var}: {value:?}: {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("http://localhost:11434/v1/chat/completions").unwrap()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4242);
        assert_eq!(config.listen_addr(), "0.0.0.0:4242");
    }

    #[test]
    fn test_upstream_config_defaults() {
        let config = UpstreamConfig::new(endpoint());
        assert!(config.default_model.is_none());
        assert!(config.api_key.is_none());
        assert!(config.timeout_seconds.is_none());
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert!(!config.is_tls());
    }

    #[test]
    fn test_upstream_config_https() {
        let config = UpstreamConfig::new(Url::parse("https://api.example.com/v1/chat/completions").unwrap());
        assert!(config.is_tls());
    }

    #[test]
    fn test_upstream_debug_redacts_api_key() {
        let mut config = UpstreamConfig::new(endpoint());
        config.api_key = Some("sk-very-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("localhost:11434"));
    }

    #[test]
    fn test_with_endpoint() {
        let config = AppConfig::with_endpoint(endpoint());
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.prompts, PromptConfig::default());
        assert_eq!(config.upstream.endpoint.path(), "/v1/chat/completions");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing(ENV_ENDPOINT);
        assert!(err.to_string().contains("LLM_API_ENDPOINT"));

        let err = ConfigError::InvalidUrl {
            var: ENV_ENDPOINT,
            value: "not a url".to_string(),
            source: Url::parse("not a url").unwrap_err(),
        };
        assert!(err.to_string().contains("not a url"));

        let err = ConfigError::Validation("bad scheme".to_string());
        assert!(err.to_string().contains("bad scheme"));
    }
}
