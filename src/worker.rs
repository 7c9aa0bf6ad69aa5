//! Bounded-concurrency request execution with retry/backoff.
//!
//! One request (one "prime request" in the grounding source) is executed by
//! [`execute_request`], which retries transient failures with exponential
//! backoff. [`Pool`] bounds how many of these can be in flight at once,
//! mirroring the teacher's percentile/metrics-recording worker but without
//! the load-model self-scheduling loop — the dispatcher drives timing, the
//! pool only bounds concurrency.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection_pool::GLOBAL_POOL_STATS;
use crate::errors::ErrorCategory;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Outcome of one request, after any retries. `attempts` counts the total
/// number of HTTP calls made (1 if the first attempt succeeded or failed
/// without being retried).
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub success: bool,
    pub error_kind: Option<&'static str>,
    pub attempts: u32,
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(10))
}

/// A 5xx status is retried; everything else that reaches the HTTP layer
/// (2xx/3xx success, 4xx client error) is not.
fn is_retryable_status(status: u16) -> bool {
    (500..600).contains(&status)
}

fn is_retryable_category(category: ErrorCategory) -> bool {
    matches!(
        category,
        ErrorCategory::NetworkError | ErrorCategory::TimeoutError | ErrorCategory::ServerError
    )
}

/// Sends one HTTP request, retrying 5xx responses and transient network/
/// timeout errors up to `max_retries` times with `min(2^attempt, 10)s`
/// backoff between attempts. 4xx responses and non-transient errors return
/// immediately without retry.
pub async fn execute_request(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Arc<String>>,
    max_retries: u32,
) -> RequestOutcome {
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        let mut request = client.request(method.clone(), url);
        if let Some(ref b) = body {
            request = request
                .header("Content-Type", "application/json")
                .body((**b).clone());
        }

        let (status_code, success, error_kind, retryable) = match request.send().await {
            Ok(mut response) => {
                let status = response.status().as_u16();
                // Drain the body in chunks rather than buffering it whole —
                // at high RPS an unconsumed body accumulates across the
                // in-flight set and drives memory up fast.
                while let Ok(Some(_chunk)) = response.chunk().await {}
                let success = (200..400).contains(&status);
                let category = ErrorCategory::from_status_code(status);
                (
                    Some(status),
                    success,
                    category.map(|c| c.label()),
                    category.map(is_retryable_category).unwrap_or(false),
                )
            }
            Err(ref e) => {
                let category = ErrorCategory::from_reqwest_error(e);
                (None, false, Some(category.label()), is_retryable_category(category))
            }
        };

        if success || !retryable || attempt >= max_retries {
            let latency_ms = start.elapsed().as_millis() as u64;
            GLOBAL_POOL_STATS.record_request(latency_ms);
            debug!(url, status_code, attempts = attempt + 1, success, "request finished");
            return RequestOutcome {
                status_code,
                latency_ms,
                success,
                error_kind,
                attempts: attempt + 1,
            };
        }

        let delay = backoff_for_attempt(attempt);
        warn!(url, attempt, delay_secs = delay.as_secs(), error_kind, "retrying request");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// A semaphore-bounded pool of in-flight requests. `max_in_flight` is the
/// run's configured user/concurrency count; the dispatcher holds a permit
/// from [`Pool::try_acquire_owned`] for the lifetime of each in-flight
/// request, same as the grounding source's `semaphore.locked()` check but
/// actually enforced rather than only read.
pub struct Pool {
    semaphore: Arc<Semaphore>,
}

impl Pool {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn is_saturated(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Grabs a permit without waiting, returning `None` if the pool is
    /// already at `max_in_flight`. The caller holds the permit for the
    /// lifetime of the request it admits, which is what actually bounds
    /// concurrency — `is_saturated` alone is only a point-in-time read.
    pub fn try_acquire_owned(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_ten_seconds() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(4));
        assert_eq!(backoff_for_attempt(5), Duration::from_secs(10));
        assert_eq!(backoff_for_attempt(20), Duration::from_secs(10));
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[tokio::test]
    async fn pool_reports_saturation() {
        let pool = Pool::new(1);
        assert!(!pool.is_saturated());
        let permit = pool.semaphore.clone().acquire_owned().await.unwrap();
        assert!(pool.is_saturated());
        drop(permit);
        assert!(!pool.is_saturated());
    }

    #[test]
    fn try_acquire_owned_is_bounded_by_max_in_flight() {
        let pool = Pool::new(2);
        let first = pool.try_acquire_owned();
        let second = pool.try_acquire_owned();
        let third = pool.try_acquire_owned();

        assert!(first.is_some());
        assert!(second.is_some());
        assert!(third.is_none());

        drop(first);
        assert!(pool.try_acquire_owned().is_some());
    }

    #[tokio::test]
    async fn execute_request_succeeds_against_mock() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let outcome = execute_request(
            &client,
            reqwest::Method::GET,
            &server.uri(),
            None,
            DEFAULT_MAX_RETRIES,
        )
        .await;

        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(200));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn execute_request_retries_5xx_then_gives_up() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let outcome = execute_request(&client, reqwest::Method::GET, &server.uri(), None, 1).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, Some(503));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn execute_request_does_not_retry_4xx() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let outcome =
            execute_request(&client, reqwest::Method::GET, &server.uri(), None, DEFAULT_MAX_RETRIES).await;

        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
    }
}
