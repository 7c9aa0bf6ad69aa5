//! Metrics fan-out. The dispatcher only knows about the [`Broadcast`]
//! trait; the websocket subscriber manager that would actually serve these
//! payloads to clients is out of scope (see `contracts.rs`). Two
//! implementations are provided so the dispatcher is runnable standalone:
//! [`LoggingBroadcast`] (structured `tracing` events) and
//! [`ChannelBroadcast`] (a `tokio::sync::broadcast` channel, used by tests
//! and as the in-process default).

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::state::{RunMetrics, Status};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsData {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub errors: u64,
    pub rps: f64,
    pub avg_latency_ms: f64,
    pub active_users_estimate: usize,
    pub configured_users: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub test_id: String,
    pub timestamp: String,
    pub status: String,
    pub data: MetricsData,
}

impl MetricsPayload {
    pub fn new(test_id: &str, status: Status, metrics: &RunMetrics, configured_users: usize) -> Self {
        Self {
            kind: "metrics",
            test_id: test_id.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            status: status.as_str().to_string(),
            data: MetricsData {
                requests_sent: metrics.request_count,
                responses_received: metrics.success_count,
                errors: metrics.failure_count,
                rps: round2(metrics.rps),
                avg_latency_ms: round2(metrics.avg_latency_ms),
                active_users_estimate: metrics.active_users_estimate,
                configured_users,
            },
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Fan-out sink for one run's metrics snapshots. Implementations must not
/// block the dispatcher loop beyond the broadcast call itself — a slow or
/// unreceiving subscriber is the fan-out's problem, not the dispatcher's.
#[async_trait]
pub trait Broadcast: Send + Sync {
    async fn broadcast(&self, payload: MetricsPayload);
}

/// Emits every snapshot as a structured `tracing` event. Useful as a
/// default when no external fan-out is wired (CLI runs, tests).
pub struct LoggingBroadcast;

#[async_trait]
impl Broadcast for LoggingBroadcast {
    async fn broadcast(&self, payload: MetricsPayload) {
        info!(
            test_id = %payload.test_id,
            status = %payload.status,
            rps = payload.data.rps,
            requests_sent = payload.data.requests_sent,
            errors = payload.data.errors,
            "metrics snapshot"
        );
    }
}

/// Publishes snapshots on a `tokio::sync::broadcast` channel. Drops the
/// payload if there are no receivers or the channel is momentarily full,
/// rather than blocking the dispatcher — this is the backpressure rule
/// from the design notes: drop an unreceiving subscriber, don't stall.
pub struct ChannelBroadcast {
    sender: tokio::sync::broadcast::Sender<MetricsPayload>,
}

impl ChannelBroadcast {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MetricsPayload> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Broadcast for ChannelBroadcast {
    async fn broadcast(&self, payload: MetricsPayload) {
        // `send` only fails when there are no receivers; that's not an
        // error here, just nothing to fan out to yet.
        let _ = self.sender.send(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunMetrics;

    #[test]
    fn payload_timestamp_ends_with_z() {
        let metrics = RunMetrics::default();
        let payload = MetricsPayload::new("t1", Status::Running, &metrics, 4);
        assert!(payload.timestamp.ends_with('Z'));
    }

    #[test]
    fn payload_rounds_rps_and_latency_to_two_decimals() {
        let mut metrics = RunMetrics::default();
        metrics.rps = 12.3456;
        metrics.avg_latency_ms = 7.891;
        let payload = MetricsPayload::new("t1", Status::Running, &metrics, 1);
        assert_eq!(payload.data.rps, 12.35);
        assert_eq!(payload.data.avg_latency_ms, 7.89);
    }

    #[tokio::test]
    async fn channel_broadcast_delivers_to_subscriber() {
        let broadcast = ChannelBroadcast::new(8);
        let mut receiver = broadcast.subscribe();
        let metrics = RunMetrics::default();
        broadcast
            .broadcast(MetricsPayload::new("t1", Status::Running, &metrics, 1))
            .await;
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.test_id, "t1");
    }

    #[tokio::test]
    async fn channel_broadcast_does_not_block_with_no_subscribers() {
        let broadcast = ChannelBroadcast::new(8);
        let metrics = RunMetrics::default();
        broadcast
            .broadcast(MetricsPayload::new("t1", Status::Running, &metrics, 1))
            .await;
    }

    #[tokio::test]
    async fn logging_broadcast_does_not_panic() {
        let broadcast = LoggingBroadcast;
        let metrics = RunMetrics::default();
        broadcast
            .broadcast(MetricsPayload::new("t1", Status::Running, &metrics, 1))
            .await;
    }
}
