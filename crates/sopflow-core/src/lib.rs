//! sopflow Core - shared vocabulary of the authoring engine
//!
//! Everything the session engine, job dispatcher and rate limiter agree on:
//! - Identifiers and caller identity
//! - Session, Job and Artifact entities with their lifecycle rules
//! - The error taxonomy surfaced to the API boundary
//! - Clock, generation/render collaborators and repository contracts
//! - In-memory repositories and engine configuration
//!
//! # Example
//!
//! ```rust
//! use sopflow_core::{ManualClock, Clock, Session, UserId};
//!
//! let clock = ManualClock::at_epoch();
//! let mut session = Session::new(UserId::from("u1"), "sop", clock.now(), chrono::Duration::hours(24));
//! session.record_input("Customer refund process", "Who performs this process?", clock.now());
//! assert_eq!(session.current_step, 2);
//! ```

#![warn(unreachable_pub)]

pub mod artifact;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod job;
pub mod memory;
pub mod repository;
pub mod session;

// Re-exports for convenience
pub use artifact::{derive_title, Artifact, DocumentSection, StructuredDocument};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{Generator, Renderer};
pub use config::{ConfigError, EngineConfig, JobConfig, RateLimitConfig, SessionConfig, TierConfig};
pub use error::{CollaboratorError, EntityKind, SopError, SopResult};
pub use identity::{Caller, CallerRole};
pub use ids::{ArtifactId, JobId, SessionId, UserId};
pub use job::{allowed_transitions, validate_transition, ExportFormat, Job, JobStatus, TransitionError};
pub use memory::{InMemoryArtifactRepository, InMemoryJobRepository, InMemorySessionRepository};
pub use repository::{ArtifactRepository, JobRepository, SessionRepository};
pub use session::{ConversationTurn, Session, SessionState, StepData, TurnRole, WIZARD_STEPS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
