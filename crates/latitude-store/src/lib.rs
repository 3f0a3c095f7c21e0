//! # latitude-store
//!
//! SQLite persistence for the confidence engine: the append-only signal log,
//! per-subject confidence records, the transition event trail, org policies,
//! and the nudge outbox.
//!
//! The signal log is the sole source of truth: every derived field on a
//! confidence record can be rebuilt by replaying it.

pub mod store;

pub use store::{BurnSummary, EngineStore};
