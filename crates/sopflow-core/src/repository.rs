//! Persistence collaborator contracts
//!
//! Lookups by id are unscoped; ownership checks belong to the caller so that
//! "absent" and "not yours" collapse into the same `NotFound` at one place.
//! Owner listings return newest first.

use crate::artifact::Artifact;
use crate::error::SopResult;
use crate::ids::{ArtifactId, JobId, SessionId, UserId};
use crate::job::Job;
use crate::session::Session;
use async_trait::async_trait;

/// Session storage
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a new session
    async fn insert(&self, session: Session) -> SopResult<()>;

    /// Fetch by id
    async fn get(&self, id: &SessionId) -> SopResult<Option<Session>>;

    /// Replace a stored session if its version still matches
    ///
    /// Returns the stored copy with its version bumped; fails with
    /// `SopError::Conflict` when another writer got there first.
    async fn update(&self, session: Session) -> SopResult<Session>;

    /// Sessions of `owner`, newest first
    async fn list_by_owner(&self, owner: &UserId) -> SopResult<Vec<Session>>;
}

/// Job storage
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a new job
    async fn insert(&self, job: Job) -> SopResult<()>;

    /// Fetch by id
    async fn get(&self, id: &JobId) -> SopResult<Option<Job>>;

    /// Replace a stored job; terminal jobs cannot be replaced
    async fn update(&self, job: Job) -> SopResult<()>;

    /// At most `limit` jobs of `owner`, newest first
    async fn list_by_owner(&self, owner: &UserId, limit: usize) -> SopResult<Vec<Job>>;
}

/// Artifact storage
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Store a new artifact
    async fn insert(&self, artifact: Artifact) -> SopResult<()>;

    /// Fetch by id
    async fn get(&self, id: &ArtifactId) -> SopResult<Option<Artifact>>;

    /// Delete by id, returning the removed artifact
    async fn remove(&self, id: &ArtifactId) -> SopResult<Option<Artifact>>;

    /// Artifacts of `owner`, newest first
    async fn list_by_owner(&self, owner: &UserId) -> SopResult<Vec<Artifact>>;
}
