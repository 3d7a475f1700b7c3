//! Background loop that acquires and executes due jobs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::JobExecutor;
use crate::config::JobExecutorConfig;

/// Starts the job executor as a background task.
///
/// While jobs are due, rounds run back to back; otherwise the worker sleeps
/// for the configured wait time. Returns when `shutdown` is cancelled.
pub async fn start_job_executor_worker(
    executor: Arc<JobExecutor>,
    config: JobExecutorConfig,
    shutdown: CancellationToken,
) {
    if !config.enabled {
        tracing::info!("Job executor disabled by configuration");
        return;
    }

    tracing::info!(
        wait_time_ms = config.wait_time_ms,
        max_jobs_per_acquisition = config.max_jobs_per_acquisition,
        "Starting job executor"
    );

    let wait_time = config.wait_time();

    loop {
        let executed = match executor.acquire_and_execute_once().await {
            Ok(executed) => executed,
            Err(e) => {
                tracing::error!(error = %e, "Error acquiring jobs");
                0
            }
        };

        if executed > 0 {
            tracing::debug!(executed, "Job acquisition round complete");
            if shutdown.is_cancelled() {
                break;
            }
            continue;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait_time) => {}
        }
    }

    tracing::info!("Job executor stopped");
}
