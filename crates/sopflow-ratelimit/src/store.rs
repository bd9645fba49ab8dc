//! Window storage
//!
//! A [`WindowStore`] owns the admission windows and performs the atomic
//! multi-tier check-then-commit. [`InMemoryWindowStore`] keeps them in
//! process memory, so limits hold per instance only; a store backed by a
//! shared counter service is required for limits that span instances.
//!
//! Windows that run empty are dropped, and identities left without windows
//! are forgotten, so the store only holds identities with live admissions.

use crate::limiter::{RateTier, TierDecision, TierOutcome};
use crate::window::SlidingWindow;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

/// Minimum time between two store-wide sweeps
const SWEEP_INTERVAL_MS: i64 = 60_000;

/// Storage and atomic evaluation of rate windows
pub trait WindowStore: Send + Sync + Debug {
    /// Evaluate every tier for `identity`; record `now_ms` in all of them only
    /// if all admit
    fn check_and_record(&self, identity: &str, tiers: &[RateTier], now_ms: i64) -> TierDecision;

    /// Forget every window of `identity`
    fn clear(&self, identity: &str);

    /// Drop windows with no admission left at `now_ms`; returns the number of
    /// identities forgotten
    fn evict_expired(&self, now_ms: i64) -> usize;

    /// Identities currently holding windows
    fn identity_count(&self) -> usize;
}

/// Window of one tier, with the length it was last checked against
#[derive(Debug, Default)]
struct TierWindow {
    window_ms: i64,
    window: SlidingWindow,
}

impl TierWindow {
    fn prune(&mut self, now_ms: i64) -> bool {
        self.window.prune(now_ms, self.window_ms);
        !self.window.is_empty()
    }
}

/// Process-local windows keyed by identity, then tier name
#[derive(Debug)]
pub struct InMemoryWindowStore {
    windows: DashMap<String, HashMap<String, TierWindow>>,
    last_sweep_ms: AtomicI64,
}

impl Default for InMemoryWindowStore {
    fn default() -> Self {
        Self {
            windows: DashMap::new(),
            last_sweep_ms: AtomicI64::new(i64::MIN),
        }
    }
}

impl InMemoryWindowStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep the whole store if the last sweep is older than the interval
    fn maybe_sweep(&self, now_ms: i64) {
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < SWEEP_INTERVAL_MS {
            return;
        }
        // One caller wins the slot; the others skip this round.
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let evicted = self.evict_expired(now_ms);
            if evicted > 0 {
                tracing::debug!(evicted, remaining = self.windows.len(), "rate windows swept");
            }
        }
    }
}

impl WindowStore for InMemoryWindowStore {
    fn check_and_record(&self, identity: &str, tiers: &[RateTier], now_ms: i64) -> TierDecision {
        // Must run before taking an entry guard: retain locks every shard.
        self.maybe_sweep(now_ms);

        // The entry guard serializes checks per identity across all its tiers.
        let mut entry = self.windows.entry(identity.to_string()).or_default();

        let outcomes: Vec<TierOutcome> = tiers
            .iter()
            .map(|tier| {
                let tracked = entry.entry(tier.name.clone()).or_default();
                tracked.window_ms = tier.window_ms();
                tracked.window.prune(now_ms, tracked.window_ms);
                TierOutcome {
                    tier: tier.name.clone(),
                    check: tracked.window.evaluate(tier.max_requests, tier.window_ms(), now_ms),
                }
            })
            .collect();

        let decision = TierDecision::new(outcomes);
        if decision.allowed() {
            for tier in tiers {
                entry.entry(tier.name.clone()).or_default().window.record(now_ms);
            }
        }

        entry.retain(|_, tracked| !tracked.window.is_empty());
        let drained = entry.is_empty();
        drop(entry);
        if drained {
            self.windows.remove_if(identity, |_, tiers| tiers.is_empty());
        }
        decision
    }

    fn clear(&self, identity: &str) {
        self.windows.remove(identity);
    }

    fn evict_expired(&self, now_ms: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, tiers| {
            tiers.retain(|_, tracked| tracked.prune(now_ms));
            !tiers.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    fn identity_count(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_tier_debits_no_tier() {
        let store = InMemoryWindowStore::new();
        let tiers = [RateTier::new("minute", 10, 60_000), RateTier::new("burst", 1, 1_000)];

        assert!(store.check_and_record("u1", &tiers, 0).allowed());
        // burst rejects; minute must not be debited
        assert!(!store.check_and_record("u1", &tiers, 100).allowed());
        assert!(!store.check_and_record("u1", &tiers, 200).allowed());

        let minute_only = [RateTier::new("minute", 10, 60_000)];
        let decision = store.check_and_record("u1", &minute_only, 300);
        assert!(decision.allowed());
        // one earlier admission plus this one
        assert_eq!(decision.summary().remaining, 8);
    }

    #[test]
    fn identities_are_independent() {
        let store = InMemoryWindowStore::new();
        let tiers = [RateTier::new("minute", 1, 60_000)];

        assert!(store.check_and_record("u1", &tiers, 0).allowed());
        assert!(store.check_and_record("u2", &tiers, 0).allowed());
        assert!(!store.check_and_record("u1", &tiers, 1).allowed());
        assert_eq!(store.identity_count(), 2);

        store.clear("u1");
        assert_eq!(store.identity_count(), 1);
        assert!(store.check_and_record("u1", &tiers, 2).allowed());
    }

    #[test]
    fn rejection_with_zero_allowance_tracks_nothing() {
        let store = InMemoryWindowStore::new();
        let tiers = [RateTier::new("closed", 0, 60_000)];

        assert!(!store.check_and_record("u1", &tiers, 0).allowed());
        assert_eq!(store.identity_count(), 0);
    }

    #[test]
    fn elapsed_windows_are_dropped_per_tier() {
        let store = InMemoryWindowStore::new();
        let short = [RateTier::new("short", 5, 1_000)];
        let long = [RateTier::new("long", 5, 60_000)];

        assert!(store.check_and_record("u1", &short, 0).allowed());
        assert!(store.check_and_record("u1", &long, 0).allowed());
        assert_eq!(store.windows.get("u1").map(|t| t.len()), Some(2));

        // short elapsed, long still holds its admission
        assert_eq!(store.evict_expired(5_000), 0);
        assert_eq!(store.windows.get("u1").map(|t| t.len()), Some(1));

        assert_eq!(store.evict_expired(60_000), 1);
        assert_eq!(store.identity_count(), 0);
    }

    #[test]
    fn checks_sweep_idle_identities() {
        let store = InMemoryWindowStore::new();
        let tiers = [RateTier::new("minute", 5, 60_000)];

        for i in 0..100 {
            assert!(store.check_and_record(&format!("user-{i}"), &tiers, 0).allowed());
        }
        assert_eq!(store.identity_count(), 100);

        assert!(store.check_and_record("user-0", &tiers, 86_400_000).allowed());
        assert_eq!(store.identity_count(), 1);
    }
}
