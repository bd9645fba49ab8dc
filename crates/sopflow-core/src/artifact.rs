//! Generated documents and the artifacts that persist them

use crate::ids::{ArtifactId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum characters kept when a title is derived from user input
pub const MAX_DERIVED_TITLE_CHARS: usize = 80;

/// One section of a generated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    /// Section heading
    pub heading: String,
    /// Section body
    pub body: String,
}

impl DocumentSection {
    /// Create new section
    #[inline]
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }
}

/// Document returned by the generation collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDocument {
    /// Document title (may be blank)
    pub title: String,
    /// Ordered sections
    pub sections: Vec<DocumentSection>,
}

impl StructuredDocument {
    /// Create document with title
    #[inline]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sections: Vec::new(),
        }
    }

    /// Append a section
    #[inline]
    #[must_use]
    pub fn with_section(mut self, heading: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.push(DocumentSection::new(heading, body));
        self
    }
}

/// Persisted generated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact id
    pub id: ArtifactId,
    /// Owning user
    pub owner: UserId,
    /// Session the artifact was generated from
    pub session_id: Option<SessionId>,
    /// Display title
    pub title: String,
    /// Generated content
    pub document: StructuredDocument,
    /// Creation instant
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Create artifact with a fresh id
    #[must_use]
    pub fn new(
        owner: UserId,
        title: impl Into<String>,
        document: StructuredDocument,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ArtifactId::new(),
            owner,
            session_id: None,
            title: title.into(),
            document,
            created_at: now,
        }
    }

    /// With explicit id
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ArtifactId>) -> Self {
        self.id = id.into();
        self
    }

    /// With originating session
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Title derived from free text: first non-blank line, trimmed and truncated
///
/// Returns `None` when the text holds no visible characters.
#[must_use]
pub fn derive_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut title: String = line.chars().take(MAX_DERIVED_TITLE_CHARS).collect();
    if line.chars().count() > MAX_DERIVED_TITLE_CHARS {
        title = title.trim_end().to_string();
        title.push('…');
    }
    Some(title)
}
