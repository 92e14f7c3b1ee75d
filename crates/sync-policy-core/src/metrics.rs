//! Metrics for the sync policy gateway
//!
//! Provides Prometheus-compatible metrics through the `metrics` facade.

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Metric names as constants for consistency
pub mod names {
    // Policy metrics
    pub const POLICY_EVALUATIONS_TOTAL: &str = "sync_policy_evaluations_total";
    pub const POLICY_REJECTIONS_TOTAL: &str = "sync_policy_rejections_total";
    pub const POLICY_EVALUATION_LATENCY: &str = "sync_policy_evaluation_latency_seconds";

    // Gateway metrics
    pub const GATEWAY_COMMITS_TOTAL: &str = "sync_gateway_commits_total";
    pub const GATEWAY_COMMIT_LATENCY: &str = "sync_gateway_commit_latency_seconds";
    pub const GATEWAY_REJECTION_LOG_SIZE: &str = "sync_gateway_rejection_log_size";
}

/// Labels for metrics
pub mod labels {
    pub const COMPONENT: &str = "component";
    pub const FAMILY: &str = "family";
    pub const OUTCOME: &str = "outcome";
    pub const FIELD: &str = "field";
    pub const STATUS: &str = "status";
}

/// Policy evaluation metrics
#[derive(Clone)]
pub struct PolicyMetrics {
    component: String,
    enabled: bool,
}

impl PolicyMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            enabled: true,
        }
    }

    /// Metrics that record nothing
    pub fn disabled() -> Self {
        Self {
            component: String::new(),
            enabled: false,
        }
    }

    /// Record an evaluation outcome for a document family
    pub fn record_evaluation(&self, family: &str, outcome: &str) {
        if !self.enabled {
            return;
        }
        counter!(
            names::POLICY_EVALUATIONS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::FAMILY => family.to_string(),
            labels::OUTCOME => outcome.to_string(),
        )
        .increment(1);
    }

    /// Record a rejection by the field that failed
    pub fn record_rejection(&self, field: &str) {
        if !self.enabled {
            return;
        }
        counter!(
            names::POLICY_REJECTIONS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::FIELD => field.to_string(),
        )
        .increment(1);
    }

    /// Record evaluation latency
    pub fn record_latency(&self, duration: Duration) {
        if !self.enabled {
            return;
        }
        histogram!(
            names::POLICY_EVALUATION_LATENCY,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }
}

/// Commit gateway metrics
#[derive(Clone)]
pub struct GatewayMetrics {
    component: String,
    enabled: bool,
}

impl GatewayMetrics {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            component: String::new(),
            enabled: false,
        }
    }

    /// Record a commit by status: "accepted", "rejected", "failed" or "timeout"
    pub fn record_commit(&self, status: &str) {
        if !self.enabled {
            return;
        }
        counter!(
            names::GATEWAY_COMMITS_TOTAL,
            labels::COMPONENT => self.component.clone(),
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Record commit latency
    pub fn record_commit_latency(&self, duration: Duration) {
        if !self.enabled {
            return;
        }
        histogram!(
            names::GATEWAY_COMMIT_LATENCY,
            labels::COMPONENT => self.component.clone(),
        )
        .record(duration.as_secs_f64());
    }

    /// Set rejection log size
    pub fn set_rejection_log_size(&self, size: usize) {
        if !self.enabled {
            return;
        }
        gauge!(
            names::GATEWAY_REJECTION_LOG_SIZE,
            labels::COMPONENT => self.component.clone(),
        )
        .set(size as f64);
    }
}

/// Timer guard for automatic latency recording
pub struct LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    /// Start a new timer
    pub fn start(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Get elapsed time without stopping
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and record
    pub fn stop(mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(f) = self.on_drop.take() {
            f(elapsed);
        }
        elapsed
    }
}

impl<F> Drop for LatencyTimer<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($metrics:expr, $method:ident, $op:expr) => {{
        let _timer = $crate::metrics::LatencyTimer::start(|d| $metrics.$method(d));
        $op
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer_records_once() {
        let mut recorded = Vec::new();
        {
            let timer = LatencyTimer::start(|d| recorded.push(d));
            std::thread::sleep(Duration::from_millis(5));
            timer.stop();
        }
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0] >= Duration::from_millis(5));
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        let mut recorded = None;
        {
            let _timer = LatencyTimer::start(|d| recorded = Some(d));
        }
        assert!(recorded.is_some());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = PolicyMetrics::new("test");
        metrics.record_evaluation("owned", "accepted");
        metrics.record_rejection("createdBy");
        GatewayMetrics::disabled().record_commit("accepted");
    }
}
