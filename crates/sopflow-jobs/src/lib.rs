//! sopflow export jobs
//!
//! Long-running export/render work tracked through a strictly forward
//! lifecycle: `PENDING -> PROCESSING -> COMPLETED | FAILED`.
//!
//! - Jobs are created PENDING and handed to a bounded worker pool
//! - Workers always drive a job to a terminal status
//! - Reads are scoped to the owning user
//! - No automatic retry: a FAILED job is resubmitted as a new job
//!
//! # Example
//!
//! ```rust,ignore
//! use sopflow_jobs::{JobCollaborators, JobDispatcher};
//!
//! let dispatcher = JobDispatcher::spawn(&config.jobs, collaborators);
//! let job = dispatcher.enqueue_job("doc-1".into(), "u1".into(), ExportFormat::Standard).await?;
//! dispatcher.shutdown().await;
//! let done = dispatcher.get_job_status(&job.id, &job.owner).await?;
//! assert!(done.is_terminal());
//! ```

#![warn(unreachable_pub)]

pub mod dispatcher;
mod worker;

pub use dispatcher::{DispatcherStats, JobCollaborators, JobDispatcher};
