//! Wire-shape DTOs for the out-of-scope admission surface (§6). No HTTP
//! router lives here — these exist so an embedding service can speak the
//! same JSON shape as the grounding source's FastAPI routes without
//! re-deriving field names, ported from
//! `original_source/src/primes/api/routers/tests.py`'s Pydantic models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::RunMetrics;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DistributionRef {
    pub name: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartTestRequest {
    #[serde(default = "default_test_type")]
    pub test_type: String,
    pub duration_seconds: Option<u64>,
    #[serde(default = "default_spawn_rate")]
    pub spawn_rate: f64,
    #[serde(default = "default_user_count")]
    pub user_count: usize,
    pub num_requests: Option<u64>,
    pub target_rps: Option<f64>,
    pub distribution: Option<DistributionRef>,
}

fn default_test_type() -> String {
    "linear".to_string()
}

fn default_spawn_rate() -> f64 {
    10.0
}

fn default_user_count() -> usize {
    1
}

/// One path-qualified admission error, e.g. `"target_rps is required when
/// using a distribution"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionError(pub String);

impl StartTestRequest {
    /// Mirrors the router's inline validation: a distribution implies
    /// `target_rps` is required, and at least one of `num_requests`/
    /// `duration_seconds` is required.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.distribution.is_some() {
            if self.target_rps.is_none() {
                return Err(AdmissionError(
                    "target_rps is required when using a distribution".to_string(),
                ));
            }
            if self.num_requests.is_none() && self.duration_seconds.is_none() {
                return Err(AdmissionError(
                    "num_requests or duration_seconds is required when using a distribution"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartTestResponse {
    pub test_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopTestRequest {
    pub test_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopTestResponse {
    pub test_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestStatusResponse {
    pub test_id: String,
    pub status: String,
    pub metrics: RunMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestsListResponse {
    pub tests: Vec<String>,
    pub active: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionValidateRequest {
    pub config: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionValidateResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}
