//! # latitude-cli
//!
//! Command-line interface for the Latitude confidence engine.
//!
//! ## Commands
//!
//! - `latitude serve`: start the engine (API server plus the sweep service)
//! - `latitude sweep`: run one rescore + promotion sweep and exit
//! - `latitude rebuild`: rebuild one subject's record from the signal log
//! - `latitude config`: show the resolved configuration

pub mod commands;

pub use commands::Cli;
