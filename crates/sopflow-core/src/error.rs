//! Error types for sopflow
//!
//! One taxonomy for every core operation:
//! - Missing or foreign entities (one message for both)
//! - Operations attempted in the wrong lifecycle state
//! - Rate limit rejections carrying the reset hint
//! - Collaborator (generation/render/storage) failures
//! - Input and configuration validation

use crate::config::ConfigError;

/// Convenience alias used across the workspace
pub type SopResult<T> = Result<T, SopError>;

/// Kind of entity referenced by a [`SopError::NotFound`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Wizard session
    Session,
    /// Export job
    Job,
    /// Generated artifact
    Artifact,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Session => "session",
            Self::Job => "job",
            Self::Artifact => "artifact",
        };
        f.write_str(name)
    }
}

/// Main sopflow error type
#[derive(Debug, thiserror::Error)]
pub enum SopError {
    /// Entity absent, or present but owned by someone else
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind
        kind: EntityKind,
        /// Requested id
        id: String,
    },

    /// Operation not permitted in the entity's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Caller exceeded a rate limit tier
    #[error("rate limit exceeded, retry in {reset_in_seconds}s")]
    RateLimitExceeded {
        /// Seconds until the oldest blocking admission leaves the window
        reset_in_seconds: u64,
    },

    /// Generation or render collaborator failed
    #[error("generation failed: {0}")]
    GenerationFailure(#[from] CollaboratorError),

    /// Missing or malformed input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Optimistic concurrency check failed
    #[error("conflict on {kind} {id}: expected version {expected}, found {found}")]
    Conflict {
        /// Entity kind
        kind: EntityKind,
        /// Entity id
        id: String,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Component is not accepting work
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Persistence collaborator failed
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SopError {
    /// Build a not-found error
    #[inline]
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Build an invalid-state error
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Build a validation error
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if error is a not-found signal
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the caller may retry the same request later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::Conflict { .. } | Self::Unavailable(_)
        )
    }
}

/// Opaque failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CollaboratorError {
    message: String,
}

impl CollaboratorError {
    /// Create new collaborator error
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error message
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
