//! External collaborator contracts
//!
//! The core never looks inside these; they may be slow and may fail.

use crate::artifact::StructuredDocument;
use crate::error::CollaboratorError;
use crate::ids::ArtifactId;
use crate::job::ExportFormat;
use async_trait::async_trait;

/// AI document generation
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a structured document from a composite prompt
    async fn generate(&self, prompt: &str) -> Result<StructuredDocument, CollaboratorError>;
}

/// File rendering/export
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `subject` in `format` and return a locator for the produced file
    async fn render(
        &self,
        subject: &ArtifactId,
        format: ExportFormat,
    ) -> Result<String, CollaboratorError>;
}
