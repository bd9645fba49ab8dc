//! In-memory repositories
//!
//! Default persistence for single-instance deployments, simulations and
//! tests. Insertion order is kept so that entities created at the same
//! instant still list newest first.

use crate::artifact::Artifact;
use crate::error::{EntityKind, SopError, SopResult};
use crate::ids::{ArtifactId, JobId, SessionId, UserId};
use crate::job::Job;
use crate::repository::{ArtifactRepository, JobRepository, SessionRepository};
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::hash::Hash;

/// Owner-filtered values, newest first; ties keep reverse insertion order
fn newest_first<K, V, F, G>(
    map: &IndexMap<K, V>,
    owner: &UserId,
    owner_of: F,
    created_at: G,
) -> Vec<V>
where
    K: Hash + Eq,
    V: Clone,
    F: Fn(&V) -> &UserId,
    G: Fn(&V) -> DateTime<Utc>,
{
    let mut items: Vec<V> = map
        .values()
        .rev()
        .filter(|v| owner_of(v) == owner)
        .cloned()
        .collect();
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    items
}

fn duplicate(kind: EntityKind, id: &str) -> SopError {
    SopError::Storage(format!("duplicate {kind} id {id}"))
}

/// In-memory [`SessionRepository`]
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<IndexMap<SessionId, Session>>,
}

impl InMemorySessionRepository {
    /// Create empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: Session) -> SopResult<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(duplicate(EntityKind::Session, session.id.as_str()));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> SopResult<Option<Session>> {
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn update(&self, mut session: Session) -> SopResult<Session> {
        let mut sessions = self.sessions.write();
        let stored = sessions
            .get_mut(&session.id)
            .ok_or_else(|| SopError::not_found(EntityKind::Session, session.id.as_str()))?;

        if stored.version != session.version {
            return Err(SopError::Conflict {
                kind: EntityKind::Session,
                id: session.id.to_string(),
                expected: session.version,
                found: stored.version,
            });
        }

        session.version += 1;
        *stored = session.clone();
        Ok(session)
    }

    async fn list_by_owner(&self, owner: &UserId) -> SopResult<Vec<Session>> {
        let sessions = self.sessions.read();
        Ok(newest_first(&*sessions, owner, |s| &s.owner, |s| s.created_at))
    }
}

/// In-memory [`JobRepository`]
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<IndexMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    /// Create empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Whether no job is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: Job) -> SopResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(duplicate(EntityKind::Job, job.id.as_str()));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> SopResult<Option<Job>> {
        Ok(self.jobs.read().get(id).cloned())
    }

    async fn update(&self, job: Job) -> SopResult<()> {
        let mut jobs = self.jobs.write();
        let stored = jobs
            .get_mut(&job.id)
            .ok_or_else(|| SopError::not_found(EntityKind::Job, job.id.as_str()))?;

        if stored.is_terminal() {
            return Err(SopError::invalid_state(format!(
                "job {} is already {}",
                job.id, stored.status
            )));
        }

        *stored = job;
        Ok(())
    }

    async fn list_by_owner(&self, owner: &UserId, limit: usize) -> SopResult<Vec<Job>> {
        let jobs = self.jobs.read();
        let mut items = newest_first(&*jobs, owner, |j| &j.owner, |j| j.created_at);
        items.truncate(limit);
        Ok(items)
    }
}

/// In-memory [`ArtifactRepository`]
#[derive(Debug, Default)]
pub struct InMemoryArtifactRepository {
    artifacts: RwLock<IndexMap<ArtifactId, Artifact>>,
}

impl InMemoryArtifactRepository {
    /// Create empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Whether no artifact is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryArtifactRepository {
    async fn insert(&self, artifact: Artifact) -> SopResult<()> {
        let mut artifacts = self.artifacts.write();
        if artifacts.contains_key(&artifact.id) {
            return Err(duplicate(EntityKind::Artifact, artifact.id.as_str()));
        }
        artifacts.insert(artifact.id.clone(), artifact);
        Ok(())
    }

    async fn get(&self, id: &ArtifactId) -> SopResult<Option<Artifact>> {
        Ok(self.artifacts.read().get(id).cloned())
    }

    async fn remove(&self, id: &ArtifactId) -> SopResult<Option<Artifact>> {
        Ok(self.artifacts.write().shift_remove(id))
    }

    async fn list_by_owner(&self, owner: &UserId) -> SopResult<Vec<Artifact>> {
        let artifacts = self.artifacts.read();
        Ok(newest_first(&*artifacts, owner, |a| &a.owner, |a| a.created_at))
    }
}
