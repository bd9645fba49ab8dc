//! Job dispatcher
//!
//! Accepts export requests and runs them on a bounded worker pool:
//! - `enqueue_job` stores a PENDING job and queues its id exactly once
//! - A dispatch loop pulls ids and runs each under a semaphore permit
//! - `shutdown` stops intake and waits for every queued and running job

use crate::worker::run_job;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sopflow_core::{
    ArtifactId, ArtifactRepository, Clock, EntityKind, ExportFormat, Job, JobConfig, JobId,
    JobRepository, Renderer, SopError, SopResult, UserId,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// Collaborators the dispatcher depends on
#[derive(Clone)]
pub struct JobCollaborators {
    /// Job storage
    pub jobs: Arc<dyn JobRepository>,
    /// Artifact lookup for subject validation
    pub artifacts: Arc<dyn ArtifactRepository>,
    /// File renderer
    pub renderer: Arc<dyn Renderer>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JobCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCollaborators")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Jobs accepted by `enqueue_job`
    pub enqueued: u64,
    /// Jobs that reached COMPLETED
    pub completed: u64,
    /// Jobs that reached FAILED
    pub failed: u64,
    /// Jobs currently rendering
    pub in_flight: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) in_flight: AtomicUsize,
}

/// State shared between the dispatcher handle and its workers
pub(crate) struct Shared {
    pub(crate) jobs: Arc<dyn JobRepository>,
    pub(crate) artifacts: Arc<dyn ArtifactRepository>,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) render_timeout: Option<Duration>,
    pub(crate) stats: Counters,
}

/// Asynchronous export job dispatcher
pub struct JobDispatcher {
    shared: Arc<Shared>,
    list_limit: usize,
    max_concurrent: usize,
    queue: Mutex<Option<mpsc::UnboundedSender<JobId>>>,
    dispatch_loop: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("max_concurrent", &self.max_concurrent)
            .field("list_limit", &self.list_limit)
            .field("accepting", &self.is_accepting())
            .field("stats", &self.stats())
            .finish()
    }
}

impl JobDispatcher {
    /// Start a dispatcher and its dispatch loop
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(config: &JobConfig, collaborators: JobCollaborators) -> Self {
        let max_concurrent = config.max_concurrent_jobs.max(1);
        let shared = Arc::new(Shared {
            jobs: collaborators.jobs,
            artifacts: collaborators.artifacts,
            renderer: collaborators.renderer,
            clock: collaborators.clock,
            render_timeout: config.render_timeout(),
            stats: Counters::default(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch_loop(shared.clone(), rx, max_concurrent));

        tracing::info!(max_concurrent, "job dispatcher started");

        Self {
            shared,
            list_limit: config.list_limit.max(1),
            max_concurrent,
            queue: Mutex::new(Some(tx)),
            dispatch_loop: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Create a PENDING export job and schedule its worker
    ///
    /// # Errors
    /// - `SopError::Validation` if `subject_id` is blank
    /// - `SopError::NotFound` if the subject does not exist for `owner`
    /// - `SopError::Unavailable` after shutdown
    pub async fn enqueue_job(
        &self,
        subject_id: ArtifactId,
        owner: UserId,
        format: ExportFormat,
    ) -> SopResult<Job> {
        if subject_id.is_blank() {
            return Err(SopError::validation("subject id is required"));
        }

        let subject = self.shared.artifacts.get(&subject_id).await?;
        if !subject.is_some_and(|a| a.owner == owner) {
            return Err(SopError::not_found(EntityKind::Artifact, subject_id.as_str()));
        }

        let sender = self
            .queue
            .lock()
            .clone()
            .ok_or_else(|| SopError::Unavailable("job dispatcher is shut down".into()))?;

        let job = Job::new(subject_id, owner, format, self.shared.clock.now());
        self.shared.jobs.insert(job.clone()).await?;

        if sender.send(job.id.clone()).is_err() {
            // Loop is gone; settle the job instead of leaving it pending.
            let mut orphan = job;
            let now = self.shared.clock.now();
            orphan.start(now)?;
            orphan.fail("dispatcher stopped before the job could run", now)?;
            self.shared.jobs.update(orphan).await?;
            return Err(SopError::Unavailable("job dispatcher is not running".into()));
        }

        self.shared.stats.enqueued.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            job_id = %job.id,
            subject = %job.subject_id,
            owner = %job.owner,
            format = %job.format,
            "job enqueued"
        );
        Ok(job)
    }

    /// Job `job_id` if owned by `owner`
    ///
    /// # Errors
    /// `SopError::NotFound` when absent or owned by someone else
    pub async fn get_job_status(&self, job_id: &JobId, owner: &UserId) -> SopResult<Job> {
        self.shared
            .jobs
            .get(job_id)
            .await?
            .filter(|job| &job.owner == owner)
            .ok_or_else(|| SopError::not_found(EntityKind::Job, job_id.as_str()))
    }

    /// Most recent jobs of `owner`, newest first
    pub async fn list_user_jobs(&self, owner: &UserId) -> SopResult<Vec<Job>> {
        self.shared.jobs.list_by_owner(owner, self.list_limit).await
    }

    /// Stop intake and wait until every accepted job is terminal
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        let sender = self.queue.lock().take();
        if sender.is_none() {
            tracing::debug!("job dispatcher already shut down");
        }
        drop(sender);

        let handle = self.dispatch_loop.lock().await.take();
        if let Some(handle) = handle {
            tracing::info!(in_flight = self.in_flight(), "draining job dispatcher");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatch loop terminated abnormally");
            }
            tracing::info!("job dispatcher stopped");
        }
    }

    /// Whether new jobs are accepted
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.queue.lock().is_some()
    }

    /// Jobs currently rendering
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.stats.in_flight.load(Ordering::SeqCst)
    }

    /// Worker pool bound
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Snapshot of dispatcher counters
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        let counters = &self.shared.stats;
        DispatcherStats {
            enqueued: counters.enqueued.load(Ordering::SeqCst),
            completed: counters.completed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            in_flight: counters.in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Pull queued ids and run each under a pool permit until the queue closes,
/// then wait for the remaining workers
async fn dispatch_loop(
    shared: Arc<Shared>,
    mut queue: mpsc::UnboundedReceiver<JobId>,
    max_concurrent: usize,
) {
    let permits = Arc::new(Semaphore::new(max_concurrent));
    let mut workers = JoinSet::new();

    while let Some(job_id) = queue.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };

        let shared = shared.clone();
        workers.spawn(async move {
            let _permit = permit;
            run_job(&shared, job_id).await;
        });

        while let Some(finished) = workers.try_join_next() {
            log_worker_exit(finished);
        }
    }

    while let Some(finished) = workers.join_next().await {
        log_worker_exit(finished);
    }
}

fn log_worker_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "job worker aborted");
    }
}
