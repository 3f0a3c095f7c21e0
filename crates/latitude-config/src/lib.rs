//! # latitude-config
//!
//! Configuration system for the Latitude engine (`latitude.toml`).
//!
//! Every promotion/demotion threshold, weighting constant, and cooldown
//! duration is a tunable here rather than a code constant; the defaults are
//! a starting policy, not a fixed contract.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    ConfigWarning, EngineTuning, LatitudeConfig, LoggingConfig, ServerConfig, StorageConfig,
    SweepConfig, WarningSeverity,
};
