//! Session engine
//!
//! Drives wizard sessions from creation to completion and turns completed
//! sessions into generated artifacts:
//! - Every lookup is ownership-scoped; foreign sessions read as missing
//! - Mutations of one session are serialized, and stored with a version check
//! - Generation is gated by the rate limiter tiers of the calling user

use crate::locks::SessionLocks;
use crate::prompts::prompt_for;
use sopflow_core::{
    derive_title, Artifact, ArtifactRepository, Caller, Clock, EngineConfig, EntityKind,
    Generator, Session, SessionConfig, SessionId, SessionRepository, SopError, SopResult,
    UserId, WIZARD_STEPS,
};
use sopflow_ratelimit::{RateLimiter, RateTier};
use std::sync::Arc;

/// Title used when neither the generator nor the inputs provide one
const FALLBACK_TITLE: &str = "Untitled procedure";

/// Collaborators the engine depends on
#[derive(Clone)]
pub struct SessionCollaborators {
    /// Session storage
    pub sessions: Arc<dyn SessionRepository>,
    /// Artifact storage
    pub artifacts: Arc<dyn ArtifactRepository>,
    /// Document generator
    pub generator: Arc<dyn Generator>,
    /// Limiter gating generation
    pub limiter: RateLimiter,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCollaborators")
            .field("limiter", &self.limiter)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Wizard session engine
pub struct SessionEngine {
    sessions: Arc<dyn SessionRepository>,
    artifacts: Arc<dyn ArtifactRepository>,
    generator: Arc<dyn Generator>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    generation_tiers: Vec<RateTier>,
    admin_bypass: bool,
    locks: SessionLocks,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("config", &self.config)
            .field("generation_tiers", &self.generation_tiers)
            .field("admin_bypass", &self.admin_bypass)
            .field("locked_sessions", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl SessionEngine {
    /// Create engine from configuration and collaborators
    #[must_use]
    pub fn new(config: &EngineConfig, collaborators: SessionCollaborators) -> Self {
        Self {
            sessions: collaborators.sessions,
            artifacts: collaborators.artifacts,
            generator: collaborators.generator,
            limiter: collaborators.limiter,
            clock: collaborators.clock,
            config: config.session.clone(),
            generation_tiers: config
                .rate_limit
                .generation_tiers
                .iter()
                .map(RateTier::from)
                .collect(),
            admin_bypass: config.rate_limit.admin_bypass,
            locks: SessionLocks::new(),
        }
    }

    /// Tiers applied to generation requests
    #[must_use]
    pub fn generation_tiers(&self) -> &[RateTier] {
        &self.generation_tiers
    }

    /// Start a new wizard session for `owner`
    ///
    /// A provided `initial_input` answers step 1 straight away.
    ///
    /// # Errors
    /// - `SopError::Validation` for a blank owner, mode or initial input
    pub async fn create_session(
        &self,
        owner: UserId,
        mode: &str,
        initial_input: Option<&str>,
    ) -> SopResult<Session> {
        if owner.is_blank() {
            return Err(SopError::validation("owner is required"));
        }
        if mode.trim().is_empty() {
            return Err(SopError::validation("mode is required"));
        }
        if initial_input.is_some_and(|text| text.trim().is_empty()) {
            return Err(SopError::validation("initial input must not be blank"));
        }

        let now = self.clock.now();
        let mut session = Session::new(owner, mode.trim(), now, self.config.ttl());
        if let Some(text) = initial_input {
            session.record_input(text, prompt_for(session.prompt_step()), now);
        }

        self.sessions.insert(session.clone()).await?;

        tracing::info!(
            session_id = %session.id,
            owner = %session.owner,
            mode = %session.mode,
            step = session.current_step,
            "session created"
        );
        Ok(session)
    }

    /// Answer the current step of `session_id`
    ///
    /// Returns the stored session after the step advanced.
    ///
    /// # Errors
    /// - `SopError::NotFound` if missing or owned by someone else
    /// - `SopError::Validation` if `text` is blank
    /// - `SopError::InvalidState` if the session is complete or expired
    pub async fn submit_input(
        &self,
        session_id: &SessionId,
        owner: &UserId,
        text: &str,
    ) -> SopResult<Session> {
        let _guard = self.locks.acquire(session_id).await;

        let mut session = self.load_owned(session_id, owner).await?;
        if text.trim().is_empty() {
            return Err(SopError::validation("input must not be blank"));
        }
        if session.completed {
            return Err(SopError::invalid_state(format!(
                "session {session_id} is already complete"
            )));
        }
        let now = self.clock.now();
        if self.config.enforce_expiry && session.is_expired(now) {
            return Err(SopError::invalid_state(format!(
                "session {session_id} has expired"
            )));
        }

        let answered = session.current_step;
        let completed = session.record_input(text, prompt_for(session.prompt_step()), now);
        let stored = self.sessions.update(session).await?;

        tracing::debug!(session_id = %stored.id, step = answered, "step answered");
        if completed {
            tracing::info!(session_id = %stored.id, steps = WIZARD_STEPS, "session completed");
        }
        Ok(stored)
    }

    /// Generate an artifact from a completed session and link it
    ///
    /// May be called again on the same session; each call produces a new
    /// artifact, relinks, and discards the artifact it replaces.
    ///
    /// # Errors
    /// - `SopError::NotFound` if missing or owned by someone else
    /// - `SopError::InvalidState` if incomplete or expired
    /// - `SopError::RateLimitExceeded` when a generation tier is exhausted
    /// - `SopError::GenerationFailure` when the generator fails; the session
    ///   keeps its previous link
    pub async fn generate_artifact(
        &self,
        caller: &Caller,
        session_id: &SessionId,
    ) -> SopResult<Artifact> {
        let _guard = self.locks.acquire(session_id).await;

        let mut session = self.load_owned(session_id, &caller.id).await?;
        if !session.completed {
            return Err(SopError::invalid_state(format!(
                "session {session_id} is not complete ({} steps remaining)",
                session.remaining_steps()
            )));
        }
        if self.config.enforce_expiry && session.is_expired(self.clock.now()) {
            return Err(SopError::invalid_state(format!(
                "session {session_id} has expired"
            )));
        }

        self.admit_generation(caller)?;

        let prompt = session.composite_prompt();
        let document = self.generator.generate(&prompt).await.map_err(|e| {
            tracing::warn!(session_id = %session.id, error = %e, "generation failed");
            SopError::from(e)
        })?;

        let title = if document.title.trim().is_empty() {
            derive_title(&prompt).unwrap_or_else(|| FALLBACK_TITLE.to_string())
        } else {
            document.title.trim().to_string()
        };

        let now = self.clock.now();
        let artifact = Artifact::new(session.owner.clone(), title, document, now)
            .with_session(session.id.clone());
        self.artifacts.insert(artifact.clone()).await?;

        let superseded = session.linked_artifact_id.clone();
        session.link_artifact(artifact.id.clone(), now);
        if let Err(e) = self.sessions.update(session).await {
            tracing::warn!(artifact_id = %artifact.id, error = %e, "link failed, discarding artifact");
            if let Err(cleanup) = self.artifacts.remove(&artifact.id).await {
                tracing::error!(artifact_id = %artifact.id, error = %cleanup, "failed to discard artifact");
            }
            return Err(e);
        }

        if let Some(previous) = superseded.filter(|id| *id != artifact.id) {
            match self.artifacts.remove(&previous).await {
                Ok(_) => tracing::debug!(artifact_id = %previous, "superseded artifact discarded"),
                Err(e) => {
                    tracing::warn!(artifact_id = %previous, error = %e, "failed to discard superseded artifact");
                }
            }
        }

        tracing::info!(
            session_id = %session_id,
            artifact_id = %artifact.id,
            title = %artifact.title,
            "artifact generated"
        );
        Ok(artifact)
    }

    /// Session `session_id` if owned by `owner`
    ///
    /// Expired sessions are still returned.
    ///
    /// # Errors
    /// `SopError::NotFound` when absent or owned by someone else
    pub async fn get_session(&self, session_id: &SessionId, owner: &UserId) -> SopResult<Session> {
        self.load_owned(session_id, owner).await
    }

    /// Sessions of `owner`, newest first
    pub async fn list_user_sessions(&self, owner: &UserId) -> SopResult<Vec<Session>> {
        self.sessions.list_by_owner(owner).await
    }

    async fn load_owned(&self, session_id: &SessionId, owner: &UserId) -> SopResult<Session> {
        self.sessions
            .get(session_id)
            .await?
            .filter(|s| s.is_owned_by(owner))
            .ok_or_else(|| SopError::not_found(EntityKind::Session, session_id.as_str()))
    }

    fn admit_generation(&self, caller: &Caller) -> SopResult<()> {
        if self.admin_bypass && caller.is_admin() {
            tracing::debug!(caller = %caller.id, "admin bypasses generation limits");
            return Ok(());
        }

        let decision = self
            .limiter
            .check_tiers(caller.id.as_str(), &self.generation_tiers);
        if decision.allowed() {
            Ok(())
        } else {
            Err(SopError::RateLimitExceeded {
                reset_in_seconds: decision.summary().reset_in_seconds,
            })
        }
    }
}
