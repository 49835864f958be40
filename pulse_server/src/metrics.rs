//! Prometheus metrics for the analysis pipeline.

use metrics::{counter, gauge, histogram};

use crate::models::job::{JobStatus, JobType};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a job state transition.
pub fn job_status_changed(job_type: JobType, status: JobStatus) {
    counter!(
        "pulse_jobs_total",
        "type" => job_type.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
}

/// Record how long a unit ran.
pub fn job_duration(job_type: JobType, duration_ms: u64) {
    histogram!("pulse_job_duration_ms", "type" => job_type.as_str()).record(duration_ms as f64);
}

/// Units currently running for a job type.
pub fn workers_in_flight(job_type: JobType, count: usize) {
    gauge!("pulse_workers_in_flight", "type" => job_type.as_str()).set(count as f64);
}

/// Record a retry of a platform or network call.
pub fn retry_scheduled(operation: &str) {
    counter!("pulse_github_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record jobs enqueued by the scheduler.
pub fn scheduler_enqueued(count: usize) {
    counter!("pulse_scheduler_enqueued_total").increment(count as u64);
}
