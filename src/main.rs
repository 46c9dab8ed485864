//! prompt-proxy: streaming reverse proxy for chat completion APIs
//!
//! Sits between a chat client and an upstream LLM API and:
//! - Forces a configured model onto every request
//! - Overwrites or extends the system prompt
//! - Streams the upstream response back unchanged

use clap::{Parser, Subcommand, ValueEnum};

use prompt_proxy::{config::AppConfig, run_server};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "prompt-proxy")]
#[command(version)]
#[command(about = "Streaming reverse proxy that rewrites chat completion requests")]
#[command(long_about = "
prompt-proxy accepts POST /chat/completions, rewrites the model and system
prompt, forwards the request to LLM_API_ENDPOINT and streams the answer back.

Configuration is read from the environment:
  LLM_API_ENDPOINT          upstream URL (required)
  DEFAULT_MODEL             model forced onto every request
  API_KEY                   bearer token sent upstream
  OVERWRITE_SYSTEM_PROMPT   replaces or prepends the system message
  APPEND_SYSTEM_PROMPT      appended to the first message (if no overwrite)
  UPSTREAM_TIMEOUT_SECONDS  total upstream request timeout (default: none)
  UPSTREAM_POOL_MAX_IDLE    idle upstream connections kept per host (default: 10)

Example usage:
  LLM_API_ENDPOINT=http://localhost:11434/v1/chat/completions prompt-proxy
  prompt-proxy check-config
")]
struct Cli {
    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server (default)
    Run {
        /// Override listen host
        #[arg(long)]
        host: Option<String>,
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate the environment configuration and print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter));
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command.unwrap_or(Commands::Run { host: None, port: None }) {
        Commands::Run { host, port } => {
            let mut config = load_config_or_exit();

            // Apply CLI overrides
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            run_server(config).await?;
        }
        Commands::CheckConfig => {
            check_config();
        }
    }

    Ok(())
}

/// Validate configuration and print a summary
fn check_config() {
    let config = load_config_or_exit();

    println!("✓ Configuration is valid\n");
    println!("Server:");
    println!("  Listen: {}", config.server.listen_addr());
    println!("\nUpstream:");
    println!("  URL: {}", config.upstream.endpoint);
    println!("  TLS: {}", if config.upstream.is_tls() { "enabled" } else { "disabled" });
    println!(
        "  Auth: {}",
        if config.upstream.api_key.is_some() { "bearer token" } else { "none" }
    );
    match config.upstream.timeout_seconds {
        Some(seconds) => println!("  Timeout: {}s", seconds),
        None => println!("  Timeout: none"),
    }
    println!("  Idle connections per host: {}", config.upstream.pool_max_idle_per_host);
    println!("\nRewrites:");
    println!(
        "  Model: {}",
        config.upstream.default_model.as_deref().unwrap_or("(client choice)")
    );
    match (&config.prompts.overwrite_system_prompt, &config.prompts.append_system_prompt) {
        (Some(prompt), append) => {
            println!("  System prompt: overwrite ({} chars)", prompt.chars().count());
            if append.is_some() {
                println!("  APPEND_SYSTEM_PROMPT is set but ignored while overwriting");
            }
        }
        (None, Some(suffix)) => println!("  System prompt: append ({} chars)", suffix.chars().count()),
        (None, None) => println!("  System prompt: unchanged"),
    }
}

/// Load configuration or exit with error
fn load_config_or_exit() -> AppConfig {
    match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nSet LLM_API_ENDPOINT to the upstream chat completion URL, e.g.:");
            eprintln!("  export LLM_API_ENDPOINT=http://localhost:11434/v1/chat/completions");
            std::process::exit(1);
        }
    }
}
