//! vigil-watchdog -- supervision engine for a long-running AI-agent gateway.
//!
//! The engine is a single-threaded cooperative loop ([`Supervisor`]) that
//! composes four modules over one shared restart gate:
//!
//! 1. [`health::GatewayHealth`] -- multi-signal classifier with exponential
//!    backoff, cooldown, wake detection, and network-transition gating
//! 2. [`heartbeat::AgentHeartbeat`] -- rate-limited agent staleness probe
//! 3. [`safeguard::ConfigSafeguard`] -- commit-confirmed config changes with
//!    a durable, crash-safe rollback ticket
//! 4. [`backup::ConfigBackup`] -- rate-limited periodic config archiver
//!
//! Platform effects are isolated behind [`probes::SystemProbes`] and
//! [`clock::Clock`] so every decision path can be driven by synthetic
//! signal traces in tests.

pub mod backup;
pub mod clock;
pub mod fsutil;
pub mod health;
pub mod heartbeat;
pub mod logtrim;
pub mod pidfile;
pub mod probes;
pub mod restart;
pub mod safeguard;
pub mod signals;
pub mod status;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testutil;

pub use clock::{Clock, SystemClock};
pub use probes::{HostProbes, SystemProbes};
pub use restart::{RestartManager, RestartOutcome};
pub use safeguard::{ConfigSafeguard, SnapshotReason};
pub use supervisor::Supervisor;
