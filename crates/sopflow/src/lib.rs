//! sopflow - SOP authoring core
//!
//! Wires the wizard session engine, the export job dispatcher and the
//! generation rate limiter behind one [`SopService`].
//!
//! ## Layout
//!
//! - `sopflow-core`: entities, errors, configuration, collaborator contracts
//! - `sopflow-ratelimit`: sliding-window limiter
//! - `sopflow-jobs`: bounded export worker pool
//! - `sopflow-session`: wizard engine and artifact generation
//! - this crate: the facade, an offline simulation and the `sopflow` binary
//!
//! # Example
//!
//! ```rust,ignore
//! let service = SopService::start(EngineConfig::default(), collaborators)?;
//! let caller = Caller::user("u1");
//!
//! let session = service.create_session(&caller, "sop", Some("Customer refund process")).await?;
//! // ... four more answers ...
//! service.generate_artifact(&caller, &session.id).await?;
//! let job = service.export_artifact(&caller, &session.id, "standard").await?;
//! ```

#![warn(unreachable_pub)]

pub mod logging;
pub mod service;
pub mod simulate;

pub use service::{ServiceCollaborators, SopService};
pub use simulate::{run_simulation, SimulationConfig, SimulationReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
