//! Process-wide configuration, loaded once from the environment at startup.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::client::ClientConfig;
use crate::connection_pool::PoolConfig;
use crate::utils::parse_duration_string;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("invalid duration format for {var}: {message}")]
    InvalidDuration { var: String, message: String },

    #[error("URL validation failed: {0}")]
    InvalidUrl(String),
}

/// Main process configuration: one HTTP target, one retry policy, and the
/// admission-surface bind address (the surface itself is out of scope, but
/// an embedding service needs somewhere to read its bind config from).
#[derive(Debug, Clone)]
pub struct Config {
    pub service_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub api_server_host: String,
    pub port: u16,
    pub workers: usize,
    pub presets_file: Option<String>,
    pub skip_tls_verify: bool,
}

fn env_required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.into()))
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var: name.into(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .to_lowercase()
        == "true"
}

impl Config {
    /// Loads configuration from environment variables, validating eagerly
    /// so a misconfigured process fails at startup, not mid-run.
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_url = env_required("SERVICE_URL")?;

        let timeout_str = env::var("REQUEST_TIMEOUT").unwrap_or_else(|_| "30s".to_string());
        let request_timeout = parse_duration_string(&timeout_str).map_err(|e| {
            ConfigError::InvalidDuration {
                var: "REQUEST_TIMEOUT".into(),
                message: e,
            }
        })?;

        let max_retries: u32 = env_parse_or("MAX_RETRIES", 3)?;
        let api_server_host =
            env::var("API_SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_parse_or("PORT", 8000)?;
        let workers: usize = env_parse_or("WORKERS", 1)?;
        let presets_file = env::var("PRESETS_FILE").ok();
        let skip_tls_verify = env_bool("SKIP_TLS_VERIFY", false);

        let config = Config {
            service_url,
            request_timeout,
            max_retries,
            api_server_host,
            port,
            workers,
            presets_file,
            skip_tls_verify,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.service_url.starts_with("http://") && !self.service_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(
                "SERVICE_URL must start with http:// or https://".into(),
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                var: "WORKERS".into(),
                message: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
            skip_tls_verify: self.skip_tls_verify,
            pool_config: PoolConfig::default(),
        }
    }

    #[cfg(test)]
    pub fn for_testing() -> Self {
        Config {
            service_url: "https://example.com".into(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            api_server_host: "0.0.0.0".into(),
            port: 8000,
            workers: 1,
            presets_file: None,
            skip_tls_verify: false,
        }
    }
}
