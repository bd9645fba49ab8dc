//! sopflow rate limiting
//!
//! Sliding-window limiter used to gate expensive generation calls:
//! - Per `(identity, tier)` windows of admission timestamps, pruned lazily
//! - Multi-tier checks that admit only when every tier admits and debit
//!   nothing on rejection
//! - Pluggable [`WindowStore`] (process-local by default)
//!
//! # Example
//!
//! ```rust
//! use sopflow_core::ManualClock;
//! use sopflow_ratelimit::RateLimiter;
//! use std::sync::Arc;
//!
//! let limiter = RateLimiter::new(Arc::new(ManualClock::at_epoch()));
//! assert!(limiter.check("u1", 2, 60_000).allowed);
//! assert!(limiter.check("u1", 2, 60_000).allowed);
//! assert!(!limiter.check("u1", 2, 60_000).allowed);
//! ```

#![warn(unreachable_pub)]

pub mod limiter;
pub mod store;
pub mod window;

pub use limiter::{RateLimiter, RateTier, TierDecision, TierOutcome};
pub use store::{InMemoryWindowStore, WindowStore};
pub use window::{RateCheck, SlidingWindow};
