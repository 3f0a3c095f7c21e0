//! # latitude-core
//!
//! Core types for the Latitude autonomy confidence engine. This crate defines
//! the shared vocabulary used by every other crate in the workspace: trust
//! tiers, behavioral signals, confidence records, transition events, and
//! organization policies.

pub mod error;
pub mod event;
pub mod policy;
pub mod record;
pub mod signal;
pub mod tier;

pub use error::{LatitudeError, Result};
pub use event::{EventType, Nudge, TierEvent};
pub use policy::{Ceiling, CeilingPolicy, OverridePolicy};
pub use record::ConfidenceRecord;
pub use signal::{Signal, SignalCounts, SignalKind, Subject};
pub use tier::Tier;
