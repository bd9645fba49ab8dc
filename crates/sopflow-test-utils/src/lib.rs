//! Testing utilities for sopflow workspace
//!
//! Shared fakes for the generation and render collaborators, fixtures and
//! polling helpers.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sopflow_core::{
    Artifact, ArtifactId, ArtifactRepository, CollaboratorError, ExportFormat, Generator, Job,
    JobId, JobRepository, ManualClock, Renderer, StructuredDocument, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_epoch())
}

/// Generator that titles the document with the prompt's first line and
/// turns every line into a section
#[derive(Debug, Default)]
pub struct EchoGenerator {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<StructuredDocument, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        let title = prompt.lines().next().unwrap_or_default().trim().to_string();
        let mut doc = StructuredDocument::new(title);
        for (i, line) in prompt.lines().enumerate() {
            doc = doc.with_section(format!("Step {}", i + 1), line.trim());
        }
        Ok(doc)
    }
}

/// Generator that returns a document with a blank title
#[derive(Debug, Default)]
pub struct UntitledGenerator;

#[async_trait]
impl Generator for UntitledGenerator {
    async fn generate(&self, prompt: &str) -> Result<StructuredDocument, CollaboratorError> {
        Ok(StructuredDocument::new("  ").with_section("Body", prompt))
    }
}

/// Generator that always fails
#[derive(Debug)]
pub struct FailingGenerator {
    message: String,
}

impl FailingGenerator {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<StructuredDocument, CollaboratorError> {
        Err(CollaboratorError::new(self.message.clone()))
    }
}

/// Renderer that returns a deterministic locator
#[derive(Debug, Default)]
pub struct StaticRenderer {
    calls: AtomicUsize,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn export_url(subject: &ArtifactId, format: ExportFormat) -> String {
    format!("https://files.test/exports/{subject}-{format}.pdf")
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render(
        &self,
        subject: &ArtifactId,
        format: ExportFormat,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(export_url(subject, format))
    }
}

/// Renderer that always fails
#[derive(Debug, Default)]
pub struct FailingRenderer;

#[async_trait]
impl Renderer for FailingRenderer {
    async fn render(
        &self,
        _subject: &ArtifactId,
        _format: ExportFormat,
    ) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::new("render service unavailable"))
    }
}

/// Renderer that panics
#[derive(Debug, Default)]
pub struct PanickingRenderer;

#[async_trait]
impl Renderer for PanickingRenderer {
    async fn render(
        &self,
        _subject: &ArtifactId,
        _format: ExportFormat,
    ) -> Result<String, CollaboratorError> {
        panic!("layout engine crashed")
    }
}

/// Renderer that never finishes
#[derive(Debug, Default)]
pub struct HangingRenderer;

#[async_trait]
impl Renderer for HangingRenderer {
    async fn render(
        &self,
        _subject: &ArtifactId,
        _format: ExportFormat,
    ) -> Result<String, CollaboratorError> {
        std::future::pending::<Result<String, CollaboratorError>>().await
    }
}

/// Renderer that blocks each call until a permit is released, and tracks
/// the highest number of concurrent calls it observed
#[derive(Debug)]
pub struct GatedRenderer {
    gate: Semaphore,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

impl GatedRenderer {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }

    /// Let `n` blocked (or future) calls finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl Default for GatedRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for GatedRenderer {
    async fn render(
        &self,
        subject: &ArtifactId,
        format: ExportFormat,
    ) -> Result<String, CollaboratorError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| CollaboratorError::new("gate closed"))?;
        permit.forget();

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(export_url(subject, format))
    }
}

pub async fn seed_artifact(
    repo: &dyn ArtifactRepository,
    id: &str,
    owner: &str,
) -> Artifact {
    let artifact = Artifact::new(
        UserId::from(owner),
        "Seeded document",
        StructuredDocument::new("Seeded document").with_section("Purpose", "Fixture"),
        chrono::Utc::now(),
    )
    .with_id(id);
    repo.insert(artifact.clone())
        .await
        .expect("seed artifact");
    artifact
}

/// Poll the repository until the job is terminal (2s budget)
pub async fn wait_for_terminal(repo: &dyn JobRepository, id: &JobId) -> Job {
    wait_for(repo, id, Job::is_terminal).await
}

/// Poll the repository until `predicate` holds for the job (2s budget)
pub async fn wait_for(repo: &dyn JobRepository, id: &JobId, predicate: fn(&Job) -> bool) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let job = repo
            .get(id)
            .await
            .expect("job lookup")
            .expect("job exists");
        if predicate(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in {}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Yield until `condition` holds (2s budget)
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
