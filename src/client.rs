//! Builds the single `reqwest::Client` the dispatcher's worker pool shares
//! across every request in a run.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::connection_pool::PoolConfig;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Configuration for building the HTTP client. Mirrors what
/// `Config::from_env` exposes — one target, one timeout, one pool shape.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub skip_tls_verify: bool,
    pub pool_config: PoolConfig,
}

pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
    builder = config.pool_config.apply_to_builder(builder);
    info!(
        timeout_secs = config.request_timeout.as_secs(),
        max_idle_per_host = config.pool_config.max_idle_per_host,
        "connection pool configured"
    );

    if config.skip_tls_verify {
        warn!("TLS certificate verification is disabled");
        builder = builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client_with_default_pool_config() {
        let config = ClientConfig {
            request_timeout: Duration::from_secs(5),
            skip_tls_verify: false,
            pool_config: PoolConfig::default(),
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn builds_client_with_tls_verification_disabled() {
        let config = ClientConfig {
            request_timeout: Duration::from_secs(5),
            skip_tls_verify: true,
            pool_config: PoolConfig::default(),
        };
        assert!(build_client(&config).is_ok());
    }
}
