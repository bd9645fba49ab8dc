//! Identifier newtypes
//!
//! Generated ids are ULIDs rendered as strings (sortable by creation time).
//! Ids handed in by collaborators (user ids, external document ids) are kept
//! verbatim, so every id wraps a `String` rather than a `Ulid`.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh ULID-backed id
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new().to_string())
            }

            /// Borrow the raw id
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the id is empty or whitespace only
            #[inline]
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Wizard session identifier
    SessionId
);

string_id!(
    /// Export job identifier
    JobId
);

string_id!(
    /// Generated artifact (document) identifier
    ArtifactId
);

string_id!(
    /// Caller identity as supplied by the identity provider
    UserId
);
