//! # latitude-engine
//!
//! The autonomy confidence engine. Tracks a trust tier per
//! (org, user, action_type) subject and moves it up or down the
//! `disabled → suggest → approve → auto` ladder based on observed outcomes
//! of past automated actions.
//!
//! Signal ingestion is the hot path: counters update and the fast demotion
//! check runs inline, serialized per subject. The windowed rescore and
//! promotion evaluation run as a scheduled sweep, one independently-committed
//! unit per subject.

pub mod engine;
pub mod ladder;
pub mod policy;
pub mod scorer;
pub mod sweep;

pub use engine::{ConfidenceEngine, IncomingSignal, IngestOutcome, RecomputeOutcome, SubjectView};
pub use ladder::{PromotionCheck, Transition, effective_tier};
pub use scorer::Rates;
pub use sweep::{SweepReport, SweepService};
