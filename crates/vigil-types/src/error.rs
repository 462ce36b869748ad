//! Error type shared across all vigil crates.

/// Errors that can occur across the watchdog runtime.
///
/// Each variant corresponds to a subsystem: configuration, persisted state,
/// snapshot handling, signal probing, or gateway service control.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Persisted state (pid file, checksum, ticket) read/write failure.
    #[error("state error: {0}")]
    StateError(String),

    /// Snapshot creation, selection, or restore failure.
    #[error("snapshot error: {0}")]
    SnapshotError(String),

    /// A health/network probe could not be executed at all.
    #[error("probe error: {0}")]
    ProbeError(String),

    /// Gateway service control (restart) failure.
    #[error("service control error: {0}")]
    ServiceError(String),
}
