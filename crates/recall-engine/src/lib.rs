//! # recall-engine - spaced-repetition scheduling core
//!
//! Pure-Rust engine behind the review workflow:
//!
//! - **ReviewScheduler** - SM-2 variant computing the next interval, ease
//!   factor, repetition count and lifecycle status for a flashcard from a
//!   0-5 quality rating and per-user tunable parameters.
//! - **StatsAggregator** - streak continuity, mastery counts and XP awards
//!   derived from each review transition.
//!
//! The engine performs no I/O and owns no clock: callers pass the review
//! instant in, which keeps every computation deterministic and testable.
//!
//! ## Modules
//!
//! - [`scheduler`] - interval/ease/status transition function
//! - [`stats`] - streak and mastery bookkeeping
//! - [`types`] - retention state, card status, algorithm config
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use recall_engine::{schedule, AlgoConfig, CardStatus};
//!
//! let config = AlgoConfig::default();
//! let out = schedule(4, config.starting_ease, 0, 0, &config, Utc::now());
//! assert_eq!(out.status, CardStatus::Learning);
//! assert_eq!(out.interval_days, 1);
//! ```

pub mod scheduler;
pub mod stats;
pub mod types;

pub use scheduler::{schedule, Scheduled, MIN_EASE};
pub use stats::{apply_review, UserStats, MASTERY_XP};
pub use types::{AlgoConfig, CardStatus, RetentionState};
