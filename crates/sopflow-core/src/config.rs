//! Engine configuration
//!
//! Loaded from TOML; every section and field has a default so an empty file
//! (or no file at all) yields a working single-instance setup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default session time-to-live (24h)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Default bound on `list_user_jobs`
pub const DEFAULT_JOB_LIST_LIMIT: usize = 50;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`EngineConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed values violate a constraint
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wizard session settings
    pub session: SessionConfig,
    /// Export job settings
    pub jobs: JobConfig,
    /// Generation rate limits
    pub rate_limit: RateLimitConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// With session TTL in seconds
    #[inline]
    #[must_use]
    pub fn with_session_ttl_secs(mut self, secs: u64) -> Self {
        self.session.ttl_secs = secs;
        self
    }

    /// With expiry enforcement toggled
    #[inline]
    #[must_use]
    pub fn with_enforce_expiry(mut self, enforce: bool) -> Self {
        self.session.enforce_expiry = enforce;
        self
    }

    /// With worker pool bound
    #[inline]
    #[must_use]
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.jobs.max_concurrent_jobs = max;
        self
    }

    /// With render timeout
    #[inline]
    #[must_use]
    pub fn with_render_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.jobs.render_timeout_secs = secs;
        self
    }

    /// Replace the generation tiers
    #[inline]
    #[must_use]
    pub fn with_generation_tiers(mut self, tiers: Vec<TierConfig>) -> Self {
        self.rate_limit.generation_tiers = tiers;
        self
    }

    /// With admin bypass of generation limits
    #[inline]
    #[must_use]
    pub fn with_admin_bypass(mut self, bypass: bool) -> Self {
        self.rate_limit.admin_bypass = bypass;
        self
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Invalid("session.ttl_secs must be positive".into()));
        }
        if self.jobs.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "jobs.max_concurrent_jobs must be at least 1".into(),
            ));
        }
        if self.jobs.list_limit == 0 {
            return Err(ConfigError::Invalid("jobs.list_limit must be at least 1".into()));
        }
        if self.jobs.render_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "jobs.render_timeout_secs must be positive when set".into(),
            ));
        }

        let mut names = HashSet::new();
        for tier in &self.rate_limit.generation_tiers {
            if tier.name.trim().is_empty() {
                return Err(ConfigError::Invalid("rate limit tier name is empty".into()));
            }
            if tier.window_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate limit tier {} has a zero window",
                    tier.name
                )));
            }
            if !names.insert(tier.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate rate limit tier {}",
                    tier.name
                )));
            }
        }

        Ok(())
    }
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Time-to-live from creation, in seconds
    pub ttl_secs: u64,
    /// Reject mutations on expired sessions
    pub enforce_expiry: bool,
}

impl SessionConfig {
    /// TTL as a chrono duration
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        chrono::Duration::seconds(secs.min(i64::MAX / 1000))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            enforce_expiry: true,
        }
    }
}

/// Export job settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Maximum renders running at once
    pub max_concurrent_jobs: usize,
    /// Maximum jobs returned by a listing
    pub list_limit: usize,
    /// Upper bound on a single render call
    pub render_timeout_secs: Option<u64>,
}

impl JobConfig {
    /// Render timeout as a std duration
    #[inline]
    #[must_use]
    pub fn render_timeout(&self) -> Option<std::time::Duration> {
        self.render_timeout_secs.map(std::time::Duration::from_secs)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            list_limit: DEFAULT_JOB_LIST_LIMIT,
            render_timeout_secs: None,
        }
    }
}

/// Generation rate limit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admin callers skip generation limits
    pub admin_bypass: bool,
    /// Tiers that must all admit a generation call
    pub generation_tiers: Vec<TierConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            admin_bypass: false,
            generation_tiers: vec![
                TierConfig::new("per-minute", 5, 60),
                TierConfig::new("per-hour", 30, 60 * 60),
            ],
        }
    }
}

/// One rate limit tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Tier name, unique per limiter
    pub name: String,
    /// Admissions allowed within the window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl TierConfig {
    /// Create new tier
    #[inline]
    pub fn new(name: impl Into<String>, max_requests: u32, window_secs: u64) -> Self {
        Self {
            name: name.into(),
            max_requests,
            window_secs,
        }
    }
}
