//! Shared types for the vigil watchdog.
//!
//! This crate holds everything the engine and the CLI both need: the
//! watchdog's own configuration ([`WatchdogConfig`]), the state-directory
//! layout ([`StatePaths`]), and the common error type ([`VigilError`]).

pub mod config;
pub mod error;
pub mod paths;

pub use config::{AgentWorkspace, WatchdogConfig};
pub use error::VigilError;
pub use paths::StatePaths;
