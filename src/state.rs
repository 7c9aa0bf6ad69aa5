//! Test-state store: a process-wide concurrent map from test-id to the
//! mutable state of one dispatch run, in the same `Arc<Mutex<...>>` +
//! `lazy_static!` singleton shape as [`crate::connection_pool`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Opaque named shape reference (`{name, config}`), as accepted by
/// `StartTestRequest.distribution` / composite `distribution` fields.
#[derive(Debug, Clone)]
pub struct ShapeRef {
    pub name: String,
    pub config: Value,
}

/// Immutable per-run configuration, set at admission and never mutated
/// after the run starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub test_type: String,
    pub duration_seconds: Option<u64>,
    pub num_requests: Option<u64>,
    pub target_rps: Option<f64>,
    pub user_count: usize,
    pub spawn_rate: f64,
    pub shape: Option<ShapeRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub rps: f64,
    pub avg_latency_ms: f64,
    pub active_users_estimate: usize,
}

/// Mutable state of one run. All mutation goes through `&mut` methods taken
/// behind the store's per-id `Mutex` — never mutated directly.
#[derive(Debug, Clone)]
pub struct RunState {
    pub test_id: String,
    pub status: Status,
    pub start_time: Option<std::time::Instant>,
    pub end_time: Option<std::time::Instant>,
    pub config: Option<RunConfig>,
    pub metrics: RunMetrics,
    in_flight: usize,
}

impl RunState {
    fn new(test_id: String) -> Self {
        Self {
            test_id,
            status: Status::Pending,
            start_time: None,
            end_time: None,
            config: None,
            metrics: RunMetrics::default(),
            in_flight: 0,
        }
    }

    fn configured_users(&self) -> usize {
        self.config.as_ref().map(|c| c.user_count).unwrap_or(0)
    }

    fn clamp_active_users(&mut self) {
        let configured = self.configured_users();
        if configured == 0 {
            self.metrics.active_users_estimate = self.metrics.active_users_estimate.max(0);
            return;
        }
        self.metrics.active_users_estimate = self.metrics.active_users_estimate.min(configured);
    }

    /// Call before sending a request: bumps `in_flight`/`request_count` and
    /// the active-users estimate, clamped to `[0, user_count]`.
    pub fn begin_request(&mut self) {
        self.in_flight += 1;
        self.metrics.active_users_estimate = self.in_flight;
        self.clamp_active_users();
        self.metrics.request_count += 1;
    }

    /// Call after a request completes: records success/failure, updates the
    /// rolling-average latency, and decrements `in_flight`.
    pub fn end_request(&mut self, success: bool, latency_ms: u64) {
        if success {
            self.metrics.success_count += 1;
        } else {
            self.metrics.failure_count += 1;
        }
        let count = self.metrics.request_count.max(1) as f64;
        let prev_avg = self.metrics.avg_latency_ms;
        self.metrics.avg_latency_ms = (prev_avg * (count - 1.0) + latency_ms as f64) / count;

        self.in_flight = self.in_flight.saturating_sub(1);
        self.metrics.active_users_estimate = self.in_flight;
        self.clamp_active_users();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn pending_cap_reached(&self, pending: usize, max_requests: Option<u64>) -> bool {
        match max_requests {
            None => false,
            Some(cap) => self.metrics.request_count + pending as u64 >= cap,
        }
    }

    /// Finalizes terminal bookkeeping: recomputes `metrics.rps` from
    /// elapsed wall time and zeroes the in-flight/active-users counters.
    pub fn finalize(&mut self, start: std::time::Instant, end: std::time::Instant) {
        self.end_time = Some(end);
        let duration = end.saturating_duration_since(start).as_secs_f64();
        if duration > 0.0 {
            self.metrics.rps = self.metrics.request_count as f64 / duration;
        }
        if self.status.is_terminal() {
            self.in_flight = 0;
            self.metrics.active_users_estimate = 0;
        }
    }
}

/// Process-wide store of run state, keyed by test-id. Each entry is its own
/// mutex so one run's status transition never blocks another's.
pub struct TestStore {
    runs: RwLock<HashMap<String, Arc<Mutex<RunState>>>>,
}

impl TestStore {
    pub(crate) fn empty() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, config: RunConfig) -> String {
        let test_id = Uuid::new_v4().to_string();
        let mut state = RunState::new(test_id.clone());
        state.config = Some(config);
        self.runs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(test_id.clone(), Arc::new(Mutex::new(state)));
        test_id
    }

    pub fn get(&self, test_id: &str) -> Option<Arc<Mutex<RunState>>> {
        self.runs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(test_id)
            .cloned()
    }

    pub fn list_all(&self) -> Vec<String> {
        self.runs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn list_running(&self) -> Vec<String> {
        self.runs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, state)| {
                state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .status
                    == Status::Running
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

lazy_static::lazy_static! {
    pub static ref TEST_STORE: TestStore = TestStore::empty();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            test_type: "shape".to_string(),
            duration_seconds: Some(10),
            num_requests: None,
            target_rps: Some(10.0),
            user_count: 4,
            spawn_rate: 10.0,
            shape: None,
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = TestStore::empty();
        let id = store.create(config());
        let state = store.get(&id).unwrap();
        assert_eq!(state.lock().unwrap().test_id, id);
    }

    #[test]
    fn unknown_id_is_none() {
        let store = TestStore::empty();
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn list_running_only_includes_running_status() {
        let store = TestStore::empty();
        let id = store.create(config());
        assert!(store.list_running().is_empty());
        store.get(&id).unwrap().lock().unwrap().status = Status::Running;
        assert_eq!(store.list_running(), vec![id]);
    }

    #[test]
    fn begin_and_end_request_clamp_active_users() {
        let mut state = RunState::new("t".to_string());
        state.config = Some(config());
        for _ in 0..10 {
            state.begin_request();
        }
        assert_eq!(state.metrics.active_users_estimate, 4);
        assert_eq!(state.in_flight(), 10);
        state.end_request(true, 5);
        assert_eq!(state.metrics.success_count, 1);
        assert_eq!(state.in_flight(), 9);
    }

    #[test]
    fn finalize_zeroes_in_flight_in_terminal_status() {
        let mut state = RunState::new("t".to_string());
        state.config = Some(config());
        state.begin_request();
        state.status = Status::Completed;
        let start = std::time::Instant::now();
        state.finalize(start, start + std::time::Duration::from_secs(1));
        assert_eq!(state.in_flight(), 0);
        assert_eq!(state.metrics.active_users_estimate, 0);
    }

    #[test]
    fn pending_cap_reached_counts_in_flight_requests() {
        let mut state = RunState::new("t".to_string());
        let mut cfg = config();
        cfg.num_requests = Some(5);
        state.config = Some(cfg);
        state.metrics.request_count = 3;
        assert!(!state.pending_cap_reached(1, Some(5)));
        assert!(state.pending_cap_reached(2, Some(5)));
    }
}
