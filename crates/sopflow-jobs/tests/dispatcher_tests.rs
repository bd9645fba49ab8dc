//! JobDispatcher lifecycle tests
//!
//! Tests run on the current-thread runtime, so the dispatch loop only makes
//! progress while a test awaits; a job is observably PENDING right after
//! `enqueue_job` returns.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use sopflow_core::{
    ArtifactId, ExportFormat, InMemoryArtifactRepository, InMemoryJobRepository, Job, JobConfig,
    JobId, JobRepository, JobStatus, Renderer, SopError, SopResult, UserId,
};
use sopflow_jobs::{JobCollaborators, JobDispatcher};
use sopflow_test_utils::{
    eventually, export_url, seed_artifact, test_clock, wait_for_terminal, FailingRenderer,
    GatedRenderer, HangingRenderer, PanickingRenderer, StaticRenderer,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Fixture {
    dispatcher: JobDispatcher,
    jobs: Arc<InMemoryJobRepository>,
    artifacts: Arc<InMemoryArtifactRepository>,
}

async fn fixture_with(renderer: Arc<dyn Renderer>, config: JobConfig) -> Fixture {
    let jobs = Arc::new(InMemoryJobRepository::new());
    let artifacts = Arc::new(InMemoryArtifactRepository::new());
    seed_artifact(artifacts.as_ref(), "doc-1", "u1").await;
    seed_artifact(artifacts.as_ref(), "doc-2", "u2").await;

    let dispatcher = JobDispatcher::spawn(
        &config,
        JobCollaborators {
            jobs: jobs.clone(),
            artifacts: artifacts.clone(),
            renderer,
            clock: test_clock(),
        },
    );

    Fixture {
        dispatcher,
        jobs,
        artifacts,
    }
}

async fn fixture(renderer: Arc<dyn Renderer>) -> Fixture {
    fixture_with(renderer, JobConfig::default()).await
}

/// Job store whose writes of one status fail a set number of times
struct FlakyJobs {
    inner: InMemoryJobRepository,
    failing_status: JobStatus,
    failures_left: AtomicUsize,
    failed_writes: AtomicUsize,
}

impl FlakyJobs {
    fn new(failing_status: JobStatus, failures: usize) -> Self {
        Self {
            inner: InMemoryJobRepository::new(),
            failing_status,
            failures_left: AtomicUsize::new(failures),
            failed_writes: AtomicUsize::new(0),
        }
    }

    fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRepository for FlakyJobs {
    async fn insert(&self, job: Job) -> SopResult<()> {
        self.inner.insert(job).await
    }

    async fn get(&self, id: &JobId) -> SopResult<Option<Job>> {
        self.inner.get(id).await
    }

    async fn update(&self, job: Job) -> SopResult<()> {
        if job.status == self.failing_status
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(SopError::Storage("job table unavailable".to_string()));
        }
        self.inner.update(job).await
    }

    async fn list_by_owner(&self, owner: &UserId, limit: usize) -> SopResult<Vec<Job>> {
        self.inner.list_by_owner(owner, limit).await
    }
}

async fn flaky_dispatcher(jobs: Arc<FlakyJobs>, renderer: Arc<dyn Renderer>) -> JobDispatcher {
    let artifacts = Arc::new(InMemoryArtifactRepository::new());
    seed_artifact(artifacts.as_ref(), "doc-1", "u1").await;
    JobDispatcher::spawn(
        &JobConfig::default(),
        JobCollaborators {
            jobs,
            artifacts,
            renderer,
            clock: test_clock(),
        },
    )
}

fn u1() -> UserId {
    UserId::from("u1")
}

#[tokio::test]
async fn test_enqueue_returns_pending_then_completes() {
    let f = fixture(Arc::new(StaticRenderer::new())).await;

    let job = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let status = f.dispatcher.get_job_status(&job.id, &u1()).await.unwrap();
    assert_eq!(status.status, JobStatus::Pending);

    let done = wait_for_terminal(f.jobs.as_ref(), &job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(
        done.file_url.as_deref(),
        Some(export_url(&ArtifactId::from("doc-1"), ExportFormat::Standard).as_str())
    );
    assert!(done.completed_at.is_some());
    assert!(done.started_at.is_some());
    assert!(done.error_message.is_none());
}

#[tokio::test]
async fn test_renderer_called_exactly_once_per_job() {
    let renderer = Arc::new(StaticRenderer::new());
    let f = fixture(renderer.clone()).await;

    for _ in 0..3 {
        f.dispatcher
            .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Compact)
            .await
            .unwrap();
    }
    f.dispatcher.shutdown().await;

    assert_eq!(renderer.calls(), 3);
    let stats = f.dispatcher.stats();
    assert_eq!(stats.enqueued, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test]
async fn test_render_error_fails_job() {
    let f = fixture(Arc::new(FailingRenderer)).await;
    let job = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap();

    let done = wait_for_terminal(f.jobs.as_ref(), &job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_message.as_deref(), Some("render service unavailable"));
    assert!(done.file_url.is_none());
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn test_render_panic_still_reaches_terminal_state() {
    let f = fixture(Arc::new(PanickingRenderer)).await;
    let job = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Detailed)
        .await
        .unwrap();

    let done = wait_for_terminal(f.jobs.as_ref(), &job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done
        .error_message
        .unwrap()
        .contains("layout engine crashed"));
}

#[tokio::test]
async fn test_render_timeout_fails_job() {
    let config = JobConfig {
        render_timeout_secs: Some(1),
        ..JobConfig::default()
    };
    let f = fixture_with(Arc::new(HangingRenderer), config).await;
    let job = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap();

    f.dispatcher.shutdown().await;
    let done = f.dispatcher.get_job_status(&job.id, &u1()).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_terminal_job_never_reverts() {
    let f = fixture(Arc::new(StaticRenderer::new())).await;
    let job = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap();
    f.dispatcher.shutdown().await;

    let first = f.dispatcher.get_job_status(&job.id, &u1()).await.unwrap();
    let second = f.dispatcher.get_job_status(&job.id, &u1()).await.unwrap();
    assert_eq!(first, second);
    assert!(first.is_terminal());

    // storage refuses to overwrite a terminal job
    let mut tampered = first.clone();
    tampered.status = JobStatus::Processing;
    let err = sopflow_core::JobRepository::update(f.jobs.as_ref(), tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, SopError::InvalidState(_)));
}

#[tokio::test]
async fn test_foreign_job_is_not_found() {
    let f = fixture(Arc::new(StaticRenderer::new())).await;
    let job = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap();

    let foreign = f
        .dispatcher
        .get_job_status(&job.id, &UserId::from("u2"))
        .await
        .unwrap_err();
    let missing = f
        .dispatcher
        .get_job_status(&"no-such-job".into(), &UserId::from("u2"))
        .await
        .unwrap_err();

    assert!(foreign.is_not_found());
    assert!(missing.is_not_found());
    assert_eq!(
        foreign.to_string().replace(job.id.as_str(), "<id>"),
        missing.to_string().replace("no-such-job", "<id>")
    );
}

#[tokio::test]
async fn test_enqueue_validates_subject() {
    let f = fixture(Arc::new(StaticRenderer::new())).await;

    let blank = f
        .dispatcher
        .enqueue_job(ArtifactId::from(" "), u1(), ExportFormat::Standard)
        .await
        .unwrap_err();
    assert!(matches!(blank, SopError::Validation(_)));

    let missing = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-404"), u1(), ExportFormat::Standard)
        .await
        .unwrap_err();
    assert!(missing.is_not_found());

    // doc-2 belongs to u2
    let foreign = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-2"), u1(), ExportFormat::Standard)
        .await
        .unwrap_err();
    assert!(foreign.is_not_found());

    assert!(f.jobs.is_empty());
    assert_eq!(f.artifacts.len(), 2);
}

#[tokio::test]
async fn test_list_user_jobs_newest_first_and_idempotent() {
    let f = fixture(Arc::new(StaticRenderer::new())).await;
    let mut ids = Vec::new();
    for format in [ExportFormat::Standard, ExportFormat::Detailed, ExportFormat::Compact] {
        let job = f
            .dispatcher
            .enqueue_job(ArtifactId::from("doc-1"), u1(), format)
            .await
            .unwrap();
        ids.push(job.id);
    }
    f.dispatcher
        .enqueue_job(ArtifactId::from("doc-2"), UserId::from("u2"), ExportFormat::Standard)
        .await
        .unwrap();
    f.dispatcher.shutdown().await;

    let first = f.dispatcher.list_user_jobs(&u1()).await.unwrap();
    let second = f.dispatcher.list_user_jobs(&u1()).await.unwrap();
    assert_eq!(first, second);

    ids.reverse();
    let listed: Vec<_> = first.into_iter().map(|j| j.id).collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_list_user_jobs_is_bounded() {
    let f = fixture(Arc::new(StaticRenderer::new())).await;
    for _ in 0..55 {
        f.dispatcher
            .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
            .await
            .unwrap();
    }
    assert_eq!(f.dispatcher.list_user_jobs(&u1()).await.unwrap().len(), 50);
    f.dispatcher.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_bounds_concurrency() {
    let renderer = Arc::new(GatedRenderer::new());
    let config = JobConfig {
        max_concurrent_jobs: 2,
        ..JobConfig::default()
    };
    let f = fixture_with(renderer.clone(), config).await;

    for _ in 0..6 {
        f.dispatcher
            .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
            .await
            .unwrap();
    }

    eventually(|| renderer.started() == 2).await;
    assert_eq!(f.dispatcher.in_flight(), 2);

    renderer.release(6);
    f.dispatcher.shutdown().await;

    assert_eq!(renderer.started(), 6);
    assert!(renderer.peak() <= 2);
    assert_eq!(f.dispatcher.stats().completed, 6);
}

#[tokio::test]
async fn test_shutdown_drains_and_rejects_new_work() {
    let renderer = Arc::new(GatedRenderer::new());
    let f = fixture(renderer.clone()).await;
    let job = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap();

    renderer.release(1);
    f.dispatcher.shutdown().await;

    assert!(!f.dispatcher.is_accepting());
    let done = f.dispatcher.get_job_status(&job.id, &u1()).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let err = f
        .dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, SopError::Unavailable(_)));
    assert!(err.is_retryable());

    // second shutdown is a no-op
    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_failed_start_write_fails_job_without_rendering() {
    let jobs = Arc::new(FlakyJobs::new(JobStatus::Processing, 1));
    let renderer = Arc::new(StaticRenderer::new());
    let dispatcher = flaky_dispatcher(jobs.clone(), renderer.clone()).await;

    let job = dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Standard)
        .await
        .unwrap();
    dispatcher.shutdown().await;

    let stored = jobs.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("could not start job")));
    assert!(stored.completed_at.is_some());
    assert_eq!(jobs.failed_writes(), 1);
    assert_eq!(renderer.calls(), 0);
    assert_eq!(dispatcher.stats().failed, 1);
}

#[tokio::test]
async fn test_terminal_write_retried_until_stored() {
    let jobs = Arc::new(FlakyJobs::new(JobStatus::Completed, 5));
    let renderer = Arc::new(StaticRenderer::new());
    let dispatcher = flaky_dispatcher(jobs.clone(), renderer.clone()).await;

    let job = dispatcher
        .enqueue_job(ArtifactId::from("doc-1"), u1(), ExportFormat::Detailed)
        .await
        .unwrap();
    dispatcher.shutdown().await;

    let stored = jobs.get(&job.id).await.unwrap().unwrap();
    assert!(stored.is_terminal());
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(jobs.failed_writes(), 5);
    assert_eq!(renderer.calls(), 1);

    let stats = dispatcher.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.in_flight, 0);
}
