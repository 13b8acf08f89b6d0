use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Output format of the log lines written to stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Service URL must start with http:// or https://, got '{0}'")]
    InvalidServiceUrl(String),

    #[error("Request timeout must be at least 1 second")]
    InvalidTimeout,

    #[error("API key cannot be empty")]
    EmptyApiKey,
}

/// Validated settings shared by every command
#[derive(Debug, Clone)]
pub struct Config {
    pub service_url: String,
    pub data_dir: PathBuf,
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl Config {
    /// Create a new config with validation
    pub fn try_new(
        service_url: String,
        data_dir: PathBuf,
        timeout_secs: u64,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let service_url = service_url.trim().trim_end_matches('/').to_string();
        if !(service_url.starts_with("http://") || service_url.starts_with("https://")) {
            return Err(ConfigError::InvalidServiceUrl(service_url));
        }

        if timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        if api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
            return Err(ConfigError::EmptyApiKey);
        }

        Ok(Self {
            service_url,
            data_dir,
            timeout: Duration::from_secs(timeout_secs),
            api_key,
        })
    }
}
