//! Export job entity and its state machine
//!
//! `Pending -> Processing -> Completed | Failed`. Terminal jobs never change;
//! every mutation goes through [`validate_transition`].

use crate::error::SopError;
use crate::ids::{ArtifactId, JobId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Queued, worker not started
    Pending,
    /// Render in progress
    Processing,
    /// Render succeeded
    Completed,
    /// Render failed
    Failed,
}

impl JobStatus {
    /// Whether no further transition is permitted
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Illegal job status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    /// Current status
    pub from: JobStatus,
    /// Requested status
    pub to: JobStatus,
}

impl From<TransitionError> for SopError {
    fn from(err: TransitionError) -> Self {
        SopError::InvalidState(err.to_string())
    }
}

/// Statuses reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: JobStatus) -> &'static [JobStatus] {
    use JobStatus::*;
    match from {
        Pending => &[Processing],
        Processing => &[Completed, Failed],
        Completed | Failed => &[],
    }
}

/// Validate a status change
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Output format requested for an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Regular layout
    #[default]
    Standard,
    /// Layout with annotations and revision notes
    Detailed,
    /// Condensed checklist layout
    Compact,
}

impl ExportFormat {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Detailed => "detailed",
            Self::Compact => "compact",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = SopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            "compact" => Ok(Self::Compact),
            other => Err(SopError::validation(format!("unknown export format: {other:?}"))),
        }
    }
}

/// Export job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job id
    pub id: JobId,
    /// Artifact being exported
    pub subject_id: ArtifactId,
    /// Owning user
    pub owner: UserId,
    /// Requested format
    pub format: ExportFormat,
    /// Current status
    pub status: JobStatus,
    /// Locator of the rendered file (completed jobs)
    pub file_url: Option<String>,
    /// Failure reason (failed jobs)
    pub error_message: Option<String>,
    /// Enqueue instant
    pub created_at: DateTime<Utc>,
    /// Worker start instant
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal instant
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job
    #[must_use]
    pub fn new(
        subject_id: ArtifactId,
        owner: UserId,
        format: ExportFormat,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            subject_id,
            owner,
            format,
            status: JobStatus::Pending,
            file_url: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Pending -> Processing
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        validate_transition(self.status, JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        Ok(())
    }

    /// Processing -> Completed
    pub fn complete(
        &mut self,
        file_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        validate_transition(self.status, JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.file_url = Some(file_url.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Processing -> Failed
    pub fn fail(
        &mut self,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        validate_transition(self.status, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Whether the job reached a terminal status
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
