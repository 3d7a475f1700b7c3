//! Prometheus metrics for the engine.
//!
//! Provides metrics for:
//! - HTTP request latency and counts
//! - Job execution outcomes and incidents
//! - History cleanup removals
//! - Batch lifecycle

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render the current metrics in the Prometheus text format, if installed.
pub fn render() -> Option<String> {
    #[cfg(feature = "prometheus")]
    {
        get_prometheus_handle().map(|handle| handle.render())
    }
    #[cfg(not(feature = "prometheus"))]
    {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        let status_class = format!("{}xx", status / 100);

        counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string(), "status" => status.to_string(), "status_class" => status_class.clone())
            .increment(1);

        histogram!("http_request_duration_seconds", "method" => method.to_string(), "path" => path.to_string(), "status_class" => status_class)
            .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (method, path, status, duration_secs);
    }
}

/// Record an error returned by the HTTP API.
pub fn record_api_error(code: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("api_errors_total", "code" => code.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = code;
    }
}

/// Record a job execution.
///
/// # Arguments
/// * `job_type` - Handler type of the job (e.g. "history-cleanup", "batch-seed-job")
/// * `outcome` - "success" or "failure"
/// * `duration_secs` - Handler run time
pub fn record_job_execution(job_type: &str, outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "job_executions_total",
            "job_type" => job_type.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!("job_execution_duration_seconds", "job_type" => job_type.to_string())
            .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (job_type, outcome, duration_secs);
    }
}

/// Record an incident raised for a job that ran out of retries.
pub fn record_job_incident(job_type: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("job_incidents_total", "job_type" => job_type.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = job_type;
    }
}

/// Record historic rows removed by a cleanup run.
///
/// # Arguments
/// * `entity` - "process_instances", "decision_instances", "case_instances",
///   "batch_operations" or "job_logs"
/// * `count` - Number of top-level rows removed
pub fn record_history_cleanup_removed(entity: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "history_cleanup_removed_total",
            "entity" => entity.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (entity, count);
    }
}

/// Record a batch lifecycle transition ("created", "completed" or "deleted").
pub fn record_batch_event(batch_type: &str, event: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "batch_events_total",
            "batch_type" => batch_type.to_string(),
            "event" => event.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (batch_type, event);
    }
}

/// Mirror an engine meter (e.g. "job-successful") as a Prometheus counter.
pub fn record_meter(name: &str, value: i64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("engine_meter_total", "name" => name.to_string())
            .increment(value.max(0) as u64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (name, value);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
