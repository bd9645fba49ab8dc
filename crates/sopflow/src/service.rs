//! Service facade
//!
//! One entry point over the session engine, the job dispatcher and the rate
//! limiter, wired from a single [`EngineConfig`]. Callers arrive already
//! authenticated; every operation is scoped to the caller's user id.

use sopflow_core::{
    Artifact, ArtifactId, ArtifactRepository, Caller, Clock, EngineConfig, EntityKind,
    ExportFormat, Generator, InMemoryArtifactRepository, InMemoryJobRepository,
    InMemorySessionRepository, Job, JobId, JobRepository, Renderer, Session, SessionId,
    SessionRepository, SopError, SopResult,
};
use sopflow_jobs::{DispatcherStats, JobCollaborators, JobDispatcher};
use sopflow_ratelimit::{InMemoryWindowStore, RateCheck, RateLimiter, WindowStore};
use sopflow_session::{SessionCollaborators, SessionEngine};
use std::sync::Arc;

/// Everything the service needs from the outside world
#[derive(Clone)]
pub struct ServiceCollaborators {
    /// Document generator
    pub generator: Arc<dyn Generator>,
    /// File renderer
    pub renderer: Arc<dyn Renderer>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Session storage
    pub sessions: Arc<dyn SessionRepository>,
    /// Job storage
    pub jobs: Arc<dyn JobRepository>,
    /// Artifact storage
    pub artifacts: Arc<dyn ArtifactRepository>,
    /// Rate window storage
    pub windows: Arc<dyn WindowStore>,
}

impl ServiceCollaborators {
    /// In-memory storage around the given generator, renderer and clock
    #[must_use]
    pub fn in_memory(
        generator: Arc<dyn Generator>,
        renderer: Arc<dyn Renderer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            generator,
            renderer,
            clock,
            sessions: Arc::new(InMemorySessionRepository::new()),
            jobs: Arc::new(InMemoryJobRepository::new()),
            artifacts: Arc::new(InMemoryArtifactRepository::new()),
            windows: Arc::new(InMemoryWindowStore::new()),
        }
    }
}

impl std::fmt::Debug for ServiceCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollaborators")
            .field("clock", &self.clock)
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}

/// SOP authoring service
pub struct SopService {
    config: EngineConfig,
    sessions: SessionEngine,
    dispatcher: JobDispatcher,
    limiter: RateLimiter,
    artifacts: Arc<dyn ArtifactRepository>,
}

impl std::fmt::Debug for SopService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SopService")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .field("dispatcher", &self.dispatcher)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl SopService {
    /// Validate `config`, wire the components and start the job dispatcher
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `SopError::Config` if the configuration is invalid
    pub fn start(config: EngineConfig, collaborators: ServiceCollaborators) -> SopResult<Self> {
        config.validate()?;

        let limiter = RateLimiter::with_store(collaborators.windows, collaborators.clock.clone());
        let sessions = SessionEngine::new(
            &config,
            SessionCollaborators {
                sessions: collaborators.sessions,
                artifacts: collaborators.artifacts.clone(),
                generator: collaborators.generator,
                limiter: limiter.clone(),
                clock: collaborators.clock.clone(),
            },
        );
        let dispatcher = JobDispatcher::spawn(
            &config.jobs,
            JobCollaborators {
                jobs: collaborators.jobs,
                artifacts: collaborators.artifacts.clone(),
                renderer: collaborators.renderer,
                clock: collaborators.clock,
            },
        );

        tracing::info!(
            ttl_secs = config.session.ttl_secs,
            enforce_expiry = config.session.enforce_expiry,
            generation_tiers = config.rate_limit.generation_tiers.len(),
            "sopflow service started"
        );

        Ok(Self {
            config,
            sessions,
            dispatcher,
            limiter,
            artifacts: collaborators.artifacts,
        })
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Sessions

    /// Start a wizard session for the caller
    pub async fn create_session(
        &self,
        caller: &Caller,
        mode: &str,
        initial_input: Option<&str>,
    ) -> SopResult<Session> {
        self.sessions
            .create_session(caller.id.clone(), mode, initial_input)
            .await
    }

    /// Answer the current step of one of the caller's sessions
    pub async fn submit_input(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        text: &str,
    ) -> SopResult<Session> {
        self.sessions.submit_input(session_id, &caller.id, text).await
    }

    /// Generate an artifact from one of the caller's completed sessions
    pub async fn generate_artifact(
        &self,
        caller: &Caller,
        session_id: &SessionId,
    ) -> SopResult<Artifact> {
        self.sessions.generate_artifact(caller, session_id).await
    }

    /// One of the caller's sessions
    pub async fn get_session(&self, caller: &Caller, session_id: &SessionId) -> SopResult<Session> {
        self.sessions.get_session(session_id, &caller.id).await
    }

    /// The caller's sessions, newest first
    pub async fn list_user_sessions(&self, caller: &Caller) -> SopResult<Vec<Session>> {
        self.sessions.list_user_sessions(&caller.id).await
    }

    /// One of the caller's artifacts
    ///
    /// # Errors
    /// `SopError::NotFound` when absent or owned by someone else
    pub async fn get_artifact(
        &self,
        caller: &Caller,
        artifact_id: &ArtifactId,
    ) -> SopResult<Artifact> {
        self.artifacts
            .get(artifact_id)
            .await?
            .filter(|a| a.owner == caller.id)
            .ok_or_else(|| SopError::not_found(EntityKind::Artifact, artifact_id.as_str()))
    }

    // Jobs

    /// Queue an export of `subject_id` in `format`
    ///
    /// # Errors
    /// - `SopError::Validation` for an unknown format or blank subject
    /// - `SopError::NotFound` when the subject is not the caller's
    /// - `SopError::Unavailable` after shutdown
    pub async fn enqueue_job(
        &self,
        caller: &Caller,
        subject_id: &str,
        format: &str,
    ) -> SopResult<Job> {
        let format: ExportFormat = format.parse()?;
        self.dispatcher
            .enqueue_job(subject_id.into(), caller.id.clone(), format)
            .await
    }

    /// Queue an export of the artifact linked to one of the caller's sessions
    ///
    /// # Errors
    /// `SopError::InvalidState` when the session has no artifact yet, plus
    /// everything [`SopService::enqueue_job`] returns
    pub async fn export_artifact(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        format: &str,
    ) -> SopResult<Job> {
        let format: ExportFormat = format.parse()?;
        let session = self.get_session(caller, session_id).await?;
        let artifact_id = session.linked_artifact_id.ok_or_else(|| {
            SopError::invalid_state(format!("session {session_id} has no generated artifact"))
        })?;
        self.dispatcher
            .enqueue_job(artifact_id, caller.id.clone(), format)
            .await
    }

    /// One of the caller's jobs
    pub async fn get_job_status(&self, caller: &Caller, job_id: &JobId) -> SopResult<Job> {
        self.dispatcher.get_job_status(job_id, &caller.id).await
    }

    /// The caller's most recent jobs, newest first
    pub async fn list_user_jobs(&self, caller: &Caller) -> SopResult<Vec<Job>> {
        self.dispatcher.list_user_jobs(&caller.id).await
    }

    /// Dispatcher counters
    #[must_use]
    pub fn job_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    // Rate limiting

    /// Ad-hoc sliding-window check on `key`
    ///
    /// Shares window storage with the generation tiers; keys are namespaced
    /// by tier name so the two never collide.
    #[must_use]
    pub fn check_rate(&self, key: &str, max_requests: u32, window_ms: u64) -> RateCheck {
        self.limiter.check(key, max_requests, window_ms)
    }

    /// Stop accepting jobs and wait for running ones
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        tracing::info!(stats = ?self.dispatcher.stats(), "sopflow service stopped");
    }
}
