//! sopflow session engine
//!
//! Conversational wizard that collects one answer per step and, once every
//! step is answered, asks the generator for a structured document.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = SessionEngine::new(&EngineConfig::default(), collaborators);
//! let owner = UserId::from("u1");
//!
//! let session = engine.create_session(owner.clone(), "sop", Some("Customer refund process")).await?;
//! for answer in ["Support agents", "Verify order", "CRM", "Manager approval over $500"] {
//!     engine.submit_input(&session.id, &owner, answer).await?;
//! }
//! let artifact = engine.generate_artifact(&Caller::user(owner), &session.id).await?;
//! ```

#![warn(unreachable_pub)]

pub mod engine;
pub mod locks;
pub mod prompts;

pub use engine::{SessionCollaborators, SessionEngine};
pub use locks::{SessionGuard, SessionLocks};
pub use prompts::prompt_for;
