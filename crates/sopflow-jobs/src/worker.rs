//! Single-job worker
//!
//! Moves one job from PENDING through PROCESSING to a terminal status. Every
//! outcome of the render call (success, error, panic, timeout) ends in
//! COMPLETED or FAILED; a job never stays in PROCESSING once the call returns.
//! Storage failures are retried with backoff until the write lands, and a job
//! whose PROCESSING write fails is failed without rendering.

use crate::dispatcher::Shared;
use futures::FutureExt;
use sopflow_core::{Job, JobId, SopError};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// First delay between storage retries
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Upper bound of the retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How a render attempt ended
#[derive(Debug)]
enum RenderOutcome {
    Rendered(String),
    Failed(String),
}

/// Run the job identified by `job_id`
pub(crate) async fn run_job(shared: &Shared, job_id: JobId) {
    let Some(mut job) = load_job(shared, &job_id).await else {
        return;
    };

    if let Err(e) = job.start(shared.clock.now()) {
        tracing::warn!(%job_id, error = %e, "skipping job that is not pending");
        return;
    }
    if let Err(e) = shared.jobs.update(job.clone()).await {
        tracing::error!(%job_id, error = %e, "failed to mark job processing");
        let reason = format!("could not start job: {e}");
        if let Err(e) = job.fail(reason.clone(), shared.clock.now()) {
            tracing::error!(%job_id, error = %e, "illegal terminal transition");
        }
        persist_terminal(shared, job).await;
        shared.stats.failed.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(%job_id, %reason, "job failed");
        return;
    }

    shared.stats.in_flight.fetch_add(1, Ordering::SeqCst);
    tracing::debug!(%job_id, subject = %job.subject_id, format = %job.format, "rendering");

    let outcome = render(shared, &job).await;

    let now = shared.clock.now();
    let transition = match &outcome {
        RenderOutcome::Rendered(url) => job.complete(url.clone(), now),
        RenderOutcome::Failed(reason) => job.fail(reason.clone(), now),
    };
    if let Err(e) = transition {
        tracing::error!(%job_id, error = %e, "illegal terminal transition");
    }

    persist_terminal(shared, job).await;
    shared.stats.in_flight.fetch_sub(1, Ordering::SeqCst);

    match outcome {
        RenderOutcome::Rendered(url) => {
            shared.stats.completed.fetch_add(1, Ordering::SeqCst);
            tracing::info!(%job_id, file_url = %url, "job completed");
        }
        RenderOutcome::Failed(reason) => {
            shared.stats.failed.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(%job_id, %reason, "job failed");
        }
    }
}

async fn render(shared: &Shared, job: &Job) -> RenderOutcome {
    let call = AssertUnwindSafe(shared.renderer.render(&job.subject_id, job.format)).catch_unwind();

    let result = match shared.render_timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                return RenderOutcome::Failed(format!(
                    "render timed out after {}s",
                    limit.as_secs()
                ))
            }
        },
        None => call.await,
    };

    match result {
        Ok(Ok(url)) if url.trim().is_empty() => {
            RenderOutcome::Failed("renderer returned an empty file locator".to_string())
        }
        Ok(Ok(url)) => RenderOutcome::Rendered(url),
        Ok(Err(e)) => RenderOutcome::Failed(e.to_string()),
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(job_id = %job.id, %detail, "renderer panicked");
            RenderOutcome::Failed(format!("renderer panicked: {detail}"))
        }
    }
}

async fn load_job(shared: &Shared, job_id: &JobId) -> Option<Job> {
    let mut delay = INITIAL_BACKOFF;
    loop {
        match shared.jobs.get(job_id).await {
            Ok(Some(job)) => return Some(job),
            Ok(None) => {
                tracing::error!(%job_id, "queued job vanished before execution");
                return None;
            }
            Err(e) => {
                tracing::warn!(%job_id, error = %e, retry_in_ms = delay.as_millis(), "failed to load queued job");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Write the terminal status, retrying until storage accepts it
///
/// Stops early only when the stored job is already terminal or gone.
async fn persist_terminal(shared: &Shared, job: Job) {
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 1u32;
    loop {
        match shared.jobs.update(job.clone()).await {
            Ok(()) => return,
            Err(SopError::InvalidState(reason)) => {
                tracing::error!(job_id = %job.id, %reason, "job already terminal");
                return;
            }
            Err(e) if e.is_not_found() => {
                tracing::error!(job_id = %job.id, "job vanished before its terminal status was stored");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    attempt,
                    status = %job.status,
                    error = %e,
                    retry_in_ms = delay.as_millis(),
                    "failed to persist terminal status"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
