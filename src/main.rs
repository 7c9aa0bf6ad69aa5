//! Thin entry point: load configuration, build the shared HTTP client, run
//! one dispatch against `SERVICE_URL`. The admission surface that would
//! normally create runs and drive this in a loop is out of scope (see
//! `contracts.rs`) — this binary exists so the crate is runnable standalone.

use std::process::ExitCode;
use std::sync::Arc;

use ratewave::broadcast::{Broadcast, LoggingBroadcast};
use ratewave::client::build_client;
use ratewave::config::Config;
use ratewave::state::{RunConfig, TEST_STORE};
use ratewave::{dispatcher, registry};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let client = match build_client(&config.to_client_config()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    info!(
        shapes = ?registry::REGISTRY.list(),
        "available rate shapes"
    );

    let run_config = RunConfig {
        test_type: "linear".to_string(),
        duration_seconds: Some(30),
        num_requests: None,
        target_rps: Some(10.0),
        user_count: 10,
        spawn_rate: 10.0,
        shape: None,
    };
    let test_id = TEST_STORE.create(run_config);
    let broadcast: Arc<dyn Broadcast> = Arc::new(LoggingBroadcast);

    info!(test_id, service_url = %config.service_url, "starting run");

    match dispatcher::dispatch(
        test_id,
        &TEST_STORE,
        client,
        config.service_url.clone(),
        config.max_retries,
        broadcast,
    )
    .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "dispatch failed");
            ExitCode::FAILURE
        }
    }
}
