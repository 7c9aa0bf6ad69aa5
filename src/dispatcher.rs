//! The dispatcher: selects a run mode at entry and drives either a
//! token-bucket shape loop or a fixed-pace request loop, structurally
//! ported from `original_source/src/primes/api/test_executor.py`'s
//! `execute_distribution_test`/`execute_duration_test`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broadcast::{Broadcast, MetricsPayload};
use crate::distributions::Distribution;
use crate::registry;
use crate::state::{RunConfig, RunState, Status, TestStore};
use crate::worker::{self, RequestOutcome};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("test '{0}' not found")]
    NotFound(String),
    #[error("run has no config")]
    MissingConfig,
    #[error("shape '{0}' configuration is invalid")]
    InvalidShape(String),
    #[error("run requires num_requests or duration_seconds when using a shape/target_rps")]
    MissingCap,
    #[error("external-driver mode is out of scope")]
    ExternalDriverUnsupported,
}

enum Mode {
    Paced,
    Shape,
    External,
}

fn select_mode(config: &RunConfig) -> Mode {
    if config.num_requests.is_some() && config.shape.is_none() && config.target_rps.is_none() {
        Mode::Paced
    } else if config.shape.is_some() || config.target_rps.is_some() {
        Mode::Shape
    } else {
        Mode::External
    }
}

fn target_rps(config: &RunConfig) -> f64 {
    config.target_rps.unwrap_or(config.spawn_rate)
}

/// Drives one run to completion (or cancellation), updating its `RunState`
/// and pushing metrics snapshots via `broadcast`. Returns `Ok(())` for
/// every run outcome except pre-flight validation/construction failure —
/// the run's terminal status, not this `Result`, carries the disposition
/// (per the design notes' error-handling rule).
pub async fn dispatch(
    test_id: String,
    store: &TestStore,
    client: reqwest::Client,
    target_url: String,
    max_retries: u32,
    broadcast: Arc<dyn Broadcast>,
) -> Result<(), DispatchError> {
    let handle = store
        .get(&test_id)
        .ok_or_else(|| DispatchError::NotFound(test_id.clone()))?;

    let config = {
        let mut state = handle.lock().unwrap_or_else(|e| e.into_inner());
        state.status = Status::Running;
        state.start_time = Some(Instant::now());
        state.config.clone().ok_or(DispatchError::MissingConfig)?
    };

    let run_result = match select_mode(&config) {
        Mode::Paced => run_paced(&test_id, &handle, &config, &client, &target_url, max_retries, &broadcast).await,
        Mode::Shape => {
            run_shape(&test_id, &handle, &config, &client, &target_url, max_retries, &broadcast).await
        }
        Mode::External => Err(DispatchError::ExternalDriverUnsupported),
    };

    let (start, end) = {
        let state = handle.lock().unwrap_or_else(|e| e.into_inner());
        (state.start_time.unwrap_or_else(Instant::now), Instant::now())
    };

    {
        let mut state = handle.lock().unwrap_or_else(|e| e.into_inner());
        state.status = match &run_result {
            Ok(()) if state.status == Status::Stopping => Status::Stopped,
            Ok(()) => Status::Completed,
            Err(DispatchError::ExternalDriverUnsupported) => Status::Failed,
            Err(_) if state.status == Status::Stopping => Status::Stopped,
            Err(_) => Status::Failed,
        };
        state.finalize(start, end);
        info!(test_id = %test_id, status = state.status.as_str(), "run finished");
    }

    push_snapshot(&test_id, &handle, config.user_count, &broadcast).await;
    run_result
}

async fn push_snapshot(
    test_id: &str,
    handle: &Arc<Mutex<RunState>>,
    configured_users: usize,
    broadcast: &Arc<dyn Broadcast>,
) {
    let payload = {
        let state = handle.lock().unwrap_or_else(|e| e.into_inner());
        MetricsPayload::new(test_id, state.status, &state.metrics, configured_users)
    };
    broadcast.broadcast(payload).await;
}

async fn run_one_request(
    handle: &Arc<Mutex<RunState>>,
    client: reqwest::Client,
    url: String,
    max_retries: u32,
) -> RequestOutcome {
    {
        let mut state = handle.lock().unwrap_or_else(|e| e.into_inner());
        state.begin_request();
    }
    let outcome = worker::execute_request(&client, reqwest::Method::GET, &url, None, max_retries).await;
    {
        let mut state = handle.lock().unwrap_or_else(|e| e.into_inner());
        state.end_request(outcome.success, outcome.latency_ms);
    }
    outcome
}

async fn run_paced(
    test_id: &str,
    handle: &Arc<Mutex<RunState>>,
    config: &RunConfig,
    client: &reqwest::Client,
    target_url: &str,
    max_retries: u32,
    broadcast: &Arc<dyn Broadcast>,
) -> Result<(), DispatchError> {
    let requests_to_send = config.num_requests.unwrap_or(100);
    let spawn_rate = config.spawn_rate;
    let interval = if spawn_rate > 0.0 {
        Duration::from_secs_f64(1.0 / spawn_rate)
    } else {
        Duration::from_secs(1)
    };
    let broadcast_every = if spawn_rate >= 1.0 {
        (spawn_rate as u64).max(1)
    } else {
        1
    };

    info!(test_id, requests_to_send, spawn_rate, "starting paced run");

    for _ in 0..requests_to_send {
        {
            let state = handle.lock().unwrap_or_else(|e| e.into_inner());
            if state.status != Status::Running {
                info!(test_id, "run no longer running, stopping paced loop");
                break;
            }
        }

        run_one_request(handle, client.clone(), target_url.to_string(), max_retries).await;

        let should_broadcast = {
            let state = handle.lock().unwrap_or_else(|e| e.into_inner());
            state.metrics.request_count % broadcast_every == 0
        };
        if should_broadcast {
            push_snapshot(test_id, handle, config.user_count, broadcast).await;
        }

        tokio::time::sleep(interval).await;
    }

    Ok(())
}

fn update_tokens(tokens: f64, current_rps: f64, tick_delta: f64) -> f64 {
    if current_rps <= 0.0 || tick_delta <= 0.0 {
        return tokens;
    }
    let max_tokens = (current_rps * 2.0).max(1.0);
    (tokens + current_rps * tick_delta).min(max_tokens)
}

async fn run_shape(
    test_id: &str,
    handle: &Arc<Mutex<RunState>>,
    config: &RunConfig,
    client: &reqwest::Client,
    target_url: &str,
    max_retries: u32,
    broadcast: &Arc<dyn Broadcast>,
) -> Result<(), DispatchError> {
    let (shape_name, shape_config) = match &config.shape {
        Some(shape_ref) => (shape_ref.name.clone(), shape_ref.config.clone()),
        None => ("constant".to_string(), serde_json::json!({})),
    };

    let plugin: Box<dyn Distribution> = registry::instantiate(&shape_name, &shape_config)
        .map_err(|_| DispatchError::InvalidShape(shape_name.clone()))?;
    if !plugin.validate() {
        return Err(DispatchError::InvalidShape(shape_name));
    }

    let max_requests = config.num_requests;
    let duration_seconds = config.duration_seconds;
    if max_requests.is_none() && duration_seconds.is_none() {
        return Err(DispatchError::MissingCap);
    }

    let rps_target = target_rps(config);
    let pool = worker::Pool::new(config.user_count.max(1));

    let start = Instant::now();
    let mut last_tick = start;
    let mut last_broadcast = start;
    let mut tokens = 0.0_f64;
    let mut handles: Vec<JoinHandle<RequestOutcome>> = Vec::new();

    info!(test_id, shape = %shape_name, target_rps = rps_target, "starting shape run");

    loop {
        let now = Instant::now();
        let elapsed = now.duration_since(start).as_secs_f64();

        let status = handle.lock().unwrap_or_else(|e| e.into_inner()).status;
        if status != Status::Running {
            info!(test_id, "run no longer running, stopping shape loop");
            break;
        }
        if let Some(d) = duration_seconds {
            if elapsed >= d as f64 {
                break;
            }
        }
        {
            let state = handle.lock().unwrap_or_else(|e| e.into_inner());
            if state.pending_cap_reached(handles.len(), max_requests) {
                break;
            }
        }

        let current_rps = plugin.get_rate(elapsed, rps_target);
        {
            let mut state = handle.lock().unwrap_or_else(|e| e.into_inner());
            state.metrics.rps = current_rps;
        }

        let tick_delta = now.duration_since(last_tick).as_secs_f64();
        last_tick = now;
        tokens = update_tokens(tokens, current_rps, tick_delta);

        if current_rps <= 0.0 {
            tokio::time::sleep(Duration::from_millis(250)).await;
            continue;
        }

        while tokens >= 1.0 {
            let cap_reached = {
                let state = handle.lock().unwrap_or_else(|e| e.into_inner());
                state.pending_cap_reached(handles.len(), max_requests)
            };
            if cap_reached {
                tokens = 0.0;
                break;
            }
            let permit = match pool.try_acquire_owned() {
                Some(permit) => permit,
                None => break,
            };
            tokens -= 1.0;

            let task_handle = Arc::clone(handle);
            let task_client = client.clone();
            let task_url = target_url.to_string();
            let join = tokio::spawn(async move {
                let _permit = permit;
                run_one_request(&task_handle, task_client, task_url, max_retries).await
            });
            handles.push(join);
        }

        handles.retain(|h| !h.is_finished());

        if now.duration_since(last_broadcast) >= Duration::from_secs(1) {
            push_snapshot(test_id, handle, config.user_count, broadcast).await;
            last_broadcast = now;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for join in handles {
        if let Err(e) = join.await {
            warn!(test_id, error = %e, "pending request task panicked during shutdown");
        }
    }

    Ok(())
}
