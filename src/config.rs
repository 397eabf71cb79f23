use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the guideline ingestion server.
#[derive(Debug)]
pub struct Config {
    /// Model identifier used to resolve the tokenizer for chunk budgeting.
    pub extraction_model: String,
    /// Optional override for the automatic chunk token budget.
    pub chunk_max_tokens: Option<usize>,
    /// Wall-clock ceiling applied to each per-dimension extraction call.
    pub extract_timeout: Duration,
    /// Interval at which the stream server polls the progress store.
    pub progress_poll_interval: Duration,
    /// Ceiling on unchanged progress before a stream closes with a timeout.
    pub stream_idle_timeout: Duration,
    /// Delay between the final progress event and stream close.
    pub stream_grace_period: Duration,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            extraction_model: load_env_optional("EXTRACTION_MODEL")
                .unwrap_or_else(|| "cl100k_base".to_string()),
            chunk_max_tokens: parse_optional("CHUNK_MAX_TOKENS")?,
            extract_timeout: Duration::from_secs(
                parse_optional("EXTRACT_TIMEOUT_SECS")?.unwrap_or(60),
            ),
            progress_poll_interval: Duration::from_millis(
                parse_optional("PROGRESS_POLL_INTERVAL_MS")?.unwrap_or(500),
            ),
            stream_idle_timeout: Duration::from_secs(
                parse_optional("STREAM_IDLE_TIMEOUT_SECS")?.unwrap_or(60),
            ),
            stream_grace_period: Duration::from_millis(
                parse_optional("STREAM_GRACE_PERIOD_MS")?.unwrap_or(1000),
            ),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        extraction_model = %config.extraction_model,
        chunk_max_tokens = ?config.chunk_max_tokens,
        extract_timeout = ?config.extract_timeout,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
