//! Rate limiter front-end
//!
//! Reads the clock, picks the tiers and delegates the atomic
//! check-then-commit to a [`WindowStore`].

use crate::store::{InMemoryWindowStore, WindowStore};
use crate::window::RateCheck;
use serde::{Deserialize, Serialize};
use sopflow_core::{Clock, TierConfig};
use std::sync::Arc;

/// One limit: at most `max_requests` admissions per sliding `window`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateTier {
    /// Tier name; windows are keyed by `(identity, name)`
    pub name: String,
    /// Admissions allowed within the window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateTier {
    /// Create new tier
    #[inline]
    pub fn new(name: impl Into<String>, max_requests: u32, window_ms: u64) -> Self {
        Self {
            name: name.into(),
            max_requests,
            window_ms,
        }
    }

    /// Tier over a one-minute window
    #[inline]
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new("per-minute", max_requests, 60_000)
    }

    /// Tier over a one-hour window
    #[inline]
    #[must_use]
    pub fn per_hour(max_requests: u32) -> Self {
        Self::new("per-hour", max_requests, 3_600_000)
    }

    /// Window length as signed milliseconds
    #[inline]
    #[must_use]
    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }
}

impl From<&TierConfig> for RateTier {
    fn from(config: &TierConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.max_requests,
            config.window_secs.saturating_mul(1000),
        )
    }
}

/// Result of one tier within a multi-tier check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierOutcome {
    /// Tier name
    pub tier: String,
    /// Evaluation of that tier (hypothetical when another tier rejected)
    pub check: RateCheck,
}

/// Combined result of a multi-tier check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDecision {
    outcomes: Vec<TierOutcome>,
}

impl TierDecision {
    /// Wrap per-tier outcomes
    #[inline]
    #[must_use]
    pub fn new(outcomes: Vec<TierOutcome>) -> Self {
        Self { outcomes }
    }

    /// Admitted only if every tier admitted
    #[inline]
    #[must_use]
    pub fn allowed(&self) -> bool {
        self.outcomes.iter().all(|o| o.check.allowed)
    }

    /// Per-tier outcomes in tier order
    #[inline]
    #[must_use]
    pub fn outcomes(&self) -> &[TierOutcome] {
        &self.outcomes
    }

    /// Tiers that rejected
    pub fn rejected_tiers(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| !o.check.allowed)
            .map(|o| o.tier.as_str())
    }

    /// Collapse into a single check
    ///
    /// `remaining` is the tightest tier's; on rejection `reset_in_seconds` is
    /// the longest wait among rejecting tiers, otherwise the tightest tier's.
    #[must_use]
    pub fn summary(&self) -> RateCheck {
        let allowed = self.allowed();

        let tightest = self
            .outcomes
            .iter()
            .min_by_key(|o| o.check.remaining)
            .map(|o| o.check);

        let reset_in_seconds = if allowed {
            tightest.map_or(0, |c| c.reset_in_seconds)
        } else {
            self.outcomes
                .iter()
                .filter(|o| !o.check.allowed)
                .map(|o| o.check.reset_in_seconds)
                .max()
                .unwrap_or(0)
        };

        RateCheck {
            allowed,
            remaining: if allowed {
                tightest.map_or(u32::MAX, |c| c.remaining)
            } else {
                0
            },
            reset_in_seconds,
        }
    }
}

/// Sliding-window rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Limiter with process-local windows
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_store(Arc::new(InMemoryWindowStore::new()), clock)
    }

    /// Limiter over a custom window store
    #[must_use]
    pub fn with_store(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Single-tier check: admit `key` at most `max_requests` times per `window_ms`
    pub fn check(&self, key: &str, max_requests: u32, window_ms: u64) -> RateCheck {
        let tier = RateTier::new(format!("window-{window_ms}ms"), max_requests, window_ms);
        self.check_tiers(key, std::slice::from_ref(&tier)).summary()
    }

    /// Multi-tier check: admitted only if all tiers admit; a rejection debits
    /// no tier
    pub fn check_tiers(&self, key: &str, tiers: &[RateTier]) -> TierDecision {
        let now_ms = self.clock.now_millis();
        let decision = self.store.check_and_record(key, tiers, now_ms);

        if decision.allowed() {
            tracing::debug!(key, tiers = tiers.len(), "rate check admitted");
        } else {
            let rejected: Vec<&str> = decision.rejected_tiers().collect();
            tracing::warn!(
                key,
                ?rejected,
                reset_in_seconds = decision.summary().reset_in_seconds,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Forget all windows of `key`
    pub fn reset(&self, key: &str) {
        self.store.clear(key);
    }

    /// Forget identities whose windows have all elapsed; returns how many
    pub fn evict_expired(&self) -> usize {
        self.store.evict_expired(self.clock.now_millis())
    }

    /// Identities currently tracked
    #[must_use]
    pub fn tracked_identities(&self) -> usize {
        self.store.identity_count()
    }
}
