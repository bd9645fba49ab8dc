//! Offline end-to-end simulation
//!
//! Runs one wizard session through generation and a batch of exports using
//! local stand-ins for the generation and render services:
//! 1. Create a session and submit the configured number of inputs
//! 2. Generate an artifact once the wizard is complete
//! 3. Export it in rotating formats and wait for every job to settle

use crate::service::{ServiceCollaborators, SopService};
use async_trait::async_trait;
use serde::Serialize;
use sopflow_core::{
    ArtifactId, Caller, Clock, CollaboratorError, EngineConfig, ExportFormat, Generator,
    JobStatus, Renderer, SopResult, StructuredDocument,
};
use sopflow_jobs::DispatcherStats;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const SAMPLE_INPUTS: [&str; 5] = [
    "Customer refund process",
    "Support agents, triggered by a refund request from a customer",
    "Verify the order\nCheck the refund policy\nIssue the refund\nNotify the customer",
    "CRM, payment console, refund policy document",
    "Refunds above $500 require manager approval",
];

const SECTION_HEADINGS: [&str; 5] = ["Purpose", "Roles", "Procedure", "Resources", "Controls"];

const FORMATS: [ExportFormat; 3] = [
    ExportFormat::Standard,
    ExportFormat::Detailed,
    ExportFormat::Compact,
];

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationConfig {
    /// Inputs submitted to the wizard (5 completes it)
    pub inputs: usize,
    /// Export jobs queued after generation
    pub jobs: usize,
    /// Make every k-th render fail
    pub fail_every: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            inputs: SAMPLE_INPUTS.len(),
            jobs: 3,
            fail_every: None,
        }
    }
}

/// Generator that lays the answers out as document sections
#[derive(Debug, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl Generator for TemplateGenerator {
    async fn generate(&self, prompt: &str) -> Result<StructuredDocument, CollaboratorError> {
        let mut document = StructuredDocument::new("");
        for (i, answer) in prompt.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            let heading = SECTION_HEADINGS.get(i).copied().unwrap_or("Notes");
            document = document.with_section(heading, answer.trim());
        }
        if document.sections.is_empty() {
            return Err(CollaboratorError::new("nothing to generate from"));
        }
        Ok(document)
    }
}

/// Renderer that produces local locators, optionally failing every k-th call
#[derive(Debug, Default)]
pub struct LocalRenderer {
    fail_every: Option<u64>,
    calls: AtomicU64,
}

impl LocalRenderer {
    /// Renderer failing every `fail_every`-th call (never when `None` or 0)
    #[must_use]
    pub fn new(fail_every: Option<u64>) -> Self {
        Self {
            fail_every: fail_every.filter(|k| *k > 0),
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Renderer for LocalRenderer {
    async fn render(
        &self,
        subject: &ArtifactId,
        format: ExportFormat,
    ) -> Result<String, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every.is_some_and(|k| call % k == 0) {
            return Err(CollaboratorError::new(format!("simulated render failure on call {call}")));
        }
        Ok(format!("local://exports/{subject}/{format}.pdf"))
    }
}

/// Outcome of one export job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    /// Job id
    pub id: String,
    /// Requested format
    pub format: ExportFormat,
    /// Final status
    pub status: JobStatus,
    /// Locator of the produced file
    pub file_url: Option<String>,
    /// Failure reason
    pub error: Option<String>,
}

/// Simulation results
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Parameters used
    pub config: SimulationConfig,
    /// Inputs the wizard accepted
    pub inputs_accepted: usize,
    /// Inputs the wizard refused
    pub inputs_rejected: usize,
    /// Step the session ended on
    pub final_step: u32,
    /// Whether the wizard completed
    pub session_completed: bool,
    /// Title of the generated artifact
    pub artifact_title: Option<String>,
    /// Why generation did not happen or failed
    pub generation_error: Option<String>,
    /// Export job outcomes
    pub jobs: Vec<JobSummary>,
    /// Dispatcher counters after drain
    pub stats: DispatcherStats,
}

impl SimulationReport {
    /// Every queued job reached a terminal status
    #[must_use]
    pub fn passed(&self) -> bool {
        let jobs_settled = self.jobs.iter().all(|j| j.status.is_terminal());
        let generated_when_complete = !self.session_completed || self.artifact_title.is_some();
        jobs_settled && generated_when_complete
    }

    /// Human-readable report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== sopflow Simulation Report ===\n\n");
        let _ = writeln!(report, "Inputs Accepted: {}", self.inputs_accepted);
        let _ = writeln!(report, "Inputs Rejected: {}", self.inputs_rejected);
        let _ = writeln!(report, "Final Step: {}", self.final_step);
        let _ = writeln!(report, "Session Completed: {}", self.session_completed);
        match (&self.artifact_title, &self.generation_error) {
            (Some(title), _) => {
                let _ = writeln!(report, "Artifact: {title}");
            }
            (None, Some(error)) => {
                let _ = writeln!(report, "Artifact: none ({error})");
            }
            (None, None) => report.push_str("Artifact: none\n"),
        }
        let _ = writeln!(report, "Jobs Enqueued: {}", self.stats.enqueued);
        let _ = writeln!(report, "Jobs Completed: {}", self.stats.completed);
        let _ = writeln!(report, "Jobs Failed: {}", self.stats.failed);

        if !self.jobs.is_empty() {
            report.push_str("\n=== Jobs ===\n");
            for (i, job) in self.jobs.iter().enumerate() {
                let detail = job
                    .file_url
                    .as_deref()
                    .or(job.error.as_deref())
                    .unwrap_or("-");
                let _ = writeln!(report, "{}. {} [{}] {} {detail}", i + 1, job.id, job.format, job.status);
            }
        }

        let _ = write!(
            report,
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Run the simulation against in-memory storage
///
/// # Errors
/// Only for invalid `engine` configuration or storage failures; wizard and
/// generation refusals are recorded in the report.
pub async fn run_simulation(
    engine: EngineConfig,
    config: SimulationConfig,
    clock: Arc<dyn Clock>,
) -> SopResult<SimulationReport> {
    let collaborators = ServiceCollaborators::in_memory(
        Arc::new(TemplateGenerator),
        Arc::new(LocalRenderer::new(config.fail_every)),
        clock,
    );
    let service = SopService::start(engine, collaborators)?;
    let caller = Caller::user("simulator");

    let mut session = service.create_session(&caller, "sop", None).await?;
    let mut accepted = 0;
    let mut rejected = 0;
    for i in 0..config.inputs {
        let text = SAMPLE_INPUTS[i % SAMPLE_INPUTS.len()];
        match service.submit_input(&caller, &session.id, text).await {
            Ok(updated) => {
                session = updated;
                accepted += 1;
            }
            Err(e) => {
                tracing::debug!(error = %e, "input rejected");
                rejected += 1;
            }
        }
    }

    let mut report = SimulationReport {
        config: config.clone(),
        inputs_accepted: accepted,
        inputs_rejected: rejected,
        final_step: session.current_step,
        session_completed: session.completed,
        artifact_title: None,
        generation_error: None,
        jobs: Vec::new(),
        stats: DispatcherStats::default(),
    };

    match service.generate_artifact(&caller, &session.id).await {
        Ok(artifact) => report.artifact_title = Some(artifact.title),
        Err(e) => report.generation_error = Some(e.to_string()),
    }

    let mut job_ids = Vec::new();
    if report.artifact_title.is_some() {
        for format in FORMATS.iter().cycle().take(config.jobs) {
            let job = service
                .export_artifact(&caller, &session.id, format.as_str())
                .await?;
            job_ids.push(job.id);
        }
    }

    service.shutdown().await;

    for id in &job_ids {
        let job = service.get_job_status(&caller, id).await?;
        report.jobs.push(JobSummary {
            id: job.id.to_string(),
            format: job.format,
            status: job.status,
            file_url: job.file_url,
            error: job.error_message,
        });
    }
    report.stats = service.job_stats();
    Ok(report)
}
