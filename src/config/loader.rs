use url::Url;

use super::{
    default_pool_max_idle, AppConfig, ConfigError, PromptConfig, ServerConfig, UpstreamConfig,
    ENV_API_KEY, ENV_APPEND_SYSTEM_PROMPT, ENV_DEFAULT_MODEL, ENV_ENDPOINT,
    ENV_OVERWRITE_SYSTEM_PROMPT, ENV_POOL_MAX_IDLE, ENV_TIMEOUT_SECONDS,
};

/// Load configuration from the process environment
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_with(|name| std::env::var(name).ok())
}

/// Load configuration through `lookup`, which maps a variable name to its value
///
/// Empty values are treated the same as unset ones.
pub fn load_config_with<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

    let raw_endpoint = get(ENV_ENDPOINT).ok_or(ConfigError::Missing(ENV_ENDPOINT))?;
    let endpoint = parse_endpoint(&raw_endpoint)?;

    let timeout_seconds = match get(ENV_TIMEOUT_SECONDS) {
        Some(raw) => Some(parse_positive(ENV_TIMEOUT_SECONDS, &raw)?),
        None => None,
    };

    let pool_max_idle_per_host = match get(ENV_POOL_MAX_IDLE) {
        Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
            ConfigError::Validation(format!("{} must be a non-negative integer, got {:?}: {}", ENV_POOL_MAX_IDLE, raw, e))
        })?,
        None => default_pool_max_idle(),
    };

    Ok(AppConfig {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            endpoint,
            default_model: get(ENV_DEFAULT_MODEL),
            api_key: get(ENV_API_KEY),
            timeout_seconds,
            pool_max_idle_per_host,
        },
        prompts: PromptConfig {
            overwrite_system_prompt: get(ENV_OVERWRITE_SYSTEM_PROMPT),
            append_system_prompt: get(ENV_APPEND_SYSTEM_PROMPT),
        },
    })
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        var: ENV_ENDPOINT,
        value: raw.to_string(),
        source,
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "{} must use http or https, got {:?}",
            ENV_ENDPOINT,
            url.scheme()
        )));
    }

    if !url.has_host() {
        return Err(ConfigError::Validation(format!("{} has no host: {:?}", ENV_ENDPOINT, raw)));
    }

    Ok(url)
}

fn parse_positive(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Validation(format!("{} must be greater than zero", var))),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Validation(format!(
            "{} must be a positive integer, got {:?}: {}",
            var, raw, e
        ))),
    }
}
