use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Default REST endpoint of the hosted generative backend.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the RAGForge service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Credential for the generative backend. Absence is reported per query, not at start-up.
    pub gemini_api_key: Option<String>,
    /// Base URL of the generative backend REST API.
    pub gemini_base_url: String,
    /// Upper bound applied to every backend call.
    pub request_timeout: Duration,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Skip the cosmetic processing delays.
    pub instant_processing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            server_port: None,
            instant_processing: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            gemini_api_key: load_env_optional("GEMINI_API_KEY")
                .or_else(|| load_env_optional("API_KEY")),
            gemini_base_url: load_env_optional("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            request_timeout: load_env_optional("REQUEST_TIMEOUT_SECS")
                .map(|value| {
                    value
                        .parse::<u64>()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .map(Duration::from_secs)
                        .ok_or_else(|| ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS".into()))
                })
                .transpose()?
                .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            instant_processing: load_env_optional("RAGFORGE_INSTANT_PROCESSING")
                .map(|value| parse_flag(&value, "RAGFORGE_INSTANT_PROCESSING"))
                .transpose()?
                .unwrap_or(false),
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
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
        base_url = %config.gemini_base_url,
        has_api_key = config.gemini_api_key.is_some(),
        timeout_secs = config.request_timeout.as_secs(),
        server_port = ?config.server_port,
        instant_processing = config.instant_processing,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("TRUE", "X").unwrap());
        assert!(parse_flag(" on ", "X").unwrap());
        assert!(!parse_flag("0", "X").unwrap());
        assert!(matches!(
            parse_flag("maybe", "X"),
            Err(ConfigError::InvalidValue(key)) if key == "X"
        ));
    }

    #[test]
    fn defaults_point_at_hosted_backend() {
        let config = Config::default();
        assert_eq!(config.gemini_base_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert!(config.gemini_api_key.is_none());
    }
}
