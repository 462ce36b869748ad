//! Commit-confirmed configuration safeguard.
//!
//! Makes every mutation of the watched gateway config reversible without
//! human intervention: change detection by content hash, a snapshot of the
//! observed state, and a durable confirm-or-revert window. The armed ticket
//! is a file, not memory, so the safety net survives the watchdog's own
//! crash.
//!
//! Note on snapshot content: by the time a change is detected the prior
//! bytes are already gone from disk, so the `pre-change` snapshot holds the
//! *new* content. True prior content comes from earlier snapshots in the
//! history; the CLI's explicit `rollback <path>` reaches them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use vigil_types::{StatePaths, VigilError, WatchdogConfig};

use crate::clock::Clock;
use crate::fsutil::{sha256_file, write_atomic};
use crate::probes::SystemProbes;
use crate::restart::RestartManager;
use crate::signals;

/// Delay after a detected change before arming, letting the external actor
/// finish its own restart of the gateway.
const POST_CHANGE_SETTLE_SECS: u64 = 10;

/// Why a snapshot was taken; becomes part of its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReason {
    /// Taken when a config change is detected.
    PreChange,
    /// Operator-requested via the CLI.
    Manual,
    /// The discarded file at rollback time.
    Broken,
}

impl SnapshotReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotReason::PreChange => "pre-change",
            SnapshotReason::Manual => "manual",
            SnapshotReason::Broken => "broken",
        }
    }
}

impl std::fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable commit-confirmed ticket. `healthy_since` is in-memory only: a
/// reloaded ticket re-enters the armed-unseen state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedTicket {
    /// Absolute epoch by which the change must be confirmed.
    pub deadline: i64,
    /// Absolute path of the snapshot the ticket would roll back to.
    pub snapshot: PathBuf,
    /// Start of the first observed healthy window, if any.
    pub healthy_since: Option<i64>,
}

/// Commit-confirmed safeguard over one watched config file.
#[derive(Debug)]
pub struct ConfigSafeguard {
    paths: StatePaths,
    config_path: PathBuf,
    rollback_timeout: u64,
    retention: usize,
    ticket: Option<ArmedTicket>,
    checksum: Option<String>,
}

impl ConfigSafeguard {
    /// Bind to the state directory and reload any surviving ticket.
    ///
    /// A ticket whose snapshot is gone violates the arming invariant; it is
    /// logged at error and dropped rather than crashing the supervisor.
    pub fn load(config: &WatchdogConfig) -> Self {
        let paths = StatePaths::new(&config.state_dir);
        let checksum = std::fs::read_to_string(paths.checksum_file())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let ticket = load_ticket(&paths);
        Self {
            paths,
            config_path: config.config_path.clone(),
            rollback_timeout: config.rollback_timeout,
            retention: config.snapshot_retention,
            ticket,
            checksum,
        }
    }

    /// Currently armed ticket, if any.
    pub fn ticket(&self) -> Option<&ArmedTicket> {
        self.ticket.as_ref()
    }

    /// Last persisted config checksum.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// One safeguard pass: advance the armed state machine, or detect a
    /// change and arm.
    pub fn tick(
        &mut self,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) {
        if self.ticket.is_some() {
            self.advance_armed(probes, clock, config, restart);
            return;
        }

        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "watched config missing, skipping");
            return;
        }
        let hash = match sha256_file(&self.config_path) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, "failed to hash watched config");
                return;
            }
        };

        let Some(previous) = self.checksum.clone() else {
            // First run: record the fingerprint, nothing to guard yet.
            tracing::info!(checksum = %&hash[..12.min(hash.len())], "recording initial config checksum");
            self.persist_checksum(&hash);
            return;
        };
        if previous == hash {
            return;
        }

        tracing::warn!(
            old = %&previous[..12.min(previous.len())],
            new = %&hash[..12.min(hash.len())],
            "config change detected, arming rollback window"
        );
        let snapshot = match self.snapshot_now(SnapshotReason::PreChange, clock.now_epoch()) {
            Ok(p) => p,
            Err(e) => {
                // Without a snapshot there is nothing to roll back to; do
                // not arm, leave the old checksum so the next tick retries.
                tracing::error!(error = %e, "snapshot failed, not arming this tick");
                return;
            }
        };

        // Let the actor that changed the config finish its own restart.
        clock.sleep(Duration::from_secs(POST_CHANGE_SETTLE_SECS));

        let deadline = clock.now_epoch() + self.rollback_timeout as i64;
        if let Err(e) = self.write_ticket(deadline, &snapshot) {
            tracing::error!(error = %e, "failed to persist rollback ticket, not arming");
            return;
        }
        self.ticket = Some(ArmedTicket {
            deadline,
            snapshot,
            healthy_since: None,
        });
        // Fingerprint whatever is on disk after the settle.
        let post_settle = sha256_file(&self.config_path).unwrap_or(hash);
        self.persist_checksum(&post_settle);
        tracing::info!(deadline, "rollback ticket armed");
    }

    /// Armed-state machine: confirm on a healthy deadline, roll back the
    /// moment the gateway is observed unhealthy. Health is re-sampled here,
    /// never reused from earlier in the tick.
    fn advance_armed(
        &mut self,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) {
        let now = clock.now_epoch();
        let healthy = signals::liveness(probes, config) && signals::http_health(probes, config);
        let Some(ticket) = self.ticket.as_mut() else {
            return;
        };

        if healthy {
            if ticket.healthy_since.is_none() {
                ticket.healthy_since = Some(now);
                tracing::info!(
                    remaining = ticket.deadline.saturating_sub(now),
                    "gateway healthy under armed config"
                );
            }
            if now >= ticket.deadline {
                tracing::info!("rollback window expired healthy, auto-confirming config");
                self.confirm();
            }
            return;
        }

        tracing::warn!("gateway unhealthy during armed window, rolling back config");
        if let Err(e) = self.rollback(None, probes, clock, config, restart) {
            tracing::error!(error = %e, "rollback failed");
        }
    }

    /// Remove the armed ticket and rewrite the checksum from the live file.
    /// Idempotent; returns whether a ticket was actually cleared.
    pub fn confirm(&mut self) -> bool {
        let had_memory = self.ticket.take().is_some();
        let had_file = self.remove_ticket_file();
        let had_ticket = had_memory || had_file;
        if had_ticket {
            if let Ok(hash) = sha256_file(&self.config_path) {
                self.persist_checksum(&hash);
            }
            tracing::info!("config change confirmed");
        }
        had_ticket
    }

    /// Restore the config from a snapshot.
    ///
    /// Target selection: `explicit` if given, else the armed ticket's
    /// snapshot, else the newest snapshot on disk. The discarded live file
    /// is snapshotted with reason `broken` first. Requests a gateway
    /// restart with reason `config-rollback`.
    pub fn rollback(
        &mut self,
        explicit: Option<&Path>,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) -> Result<PathBuf, VigilError> {
        let target = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(VigilError::SnapshotError(format!(
                        "snapshot {} does not exist",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match &self.ticket {
                Some(ticket) => ticket.snapshot.clone(),
                None => self
                    .newest_snapshot()
                    .ok_or_else(|| VigilError::SnapshotError("no snapshot available".into()))?,
            },
        };

        // Preserve the discarded file for the post-mortem.
        if self.config_path.exists() {
            if let Err(e) = self.snapshot_now(SnapshotReason::Broken, clock.now_epoch()) {
                tracing::warn!(error = %e, "could not snapshot broken config before rollback");
            }
        }

        std::fs::copy(&target, &self.config_path).map_err(|e| {
            VigilError::SnapshotError(format!(
                "failed to restore {} over {}: {e}",
                target.display(),
                self.config_path.display()
            ))
        })?;
        tracing::warn!(snapshot = %target.display(), "config rolled back");

        if let Ok(hash) = sha256_file(&self.config_path) {
            self.persist_checksum(&hash);
        }
        self.ticket = None;
        self.remove_ticket_file();
        self.prune_snapshots();

        restart.try_restart("config-rollback", probes, clock, config);
        Ok(target)
    }

    /// Copy the watched config into the snapshot store.
    pub fn snapshot(&mut self, reason: SnapshotReason, now: i64) -> Result<PathBuf, VigilError> {
        self.snapshot_now(reason, now)
    }

    fn snapshot_now(&mut self, reason: SnapshotReason, now: i64) -> Result<PathBuf, VigilError> {
        if !self.config_path.is_file() {
            return Err(VigilError::SnapshotError(format!(
                "watched config {} does not exist",
                self.config_path.display()
            )));
        }
        let dir = self.paths.snapshots_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| VigilError::SnapshotError(format!("failed to create snapshot dir: {e}")))?;

        let stem = self
            .config_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("config");
        let stamp = DateTime::<Utc>::from_timestamp(now, 0)
            .unwrap_or_default()
            .format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("{stem}-{stamp}-{reason}.json"));

        std::fs::copy(&self.config_path, &path).map_err(|e| {
            VigilError::SnapshotError(format!("failed to copy config to {}: {e}", path.display()))
        })?;
        tracing::info!(snapshot = %path.display(), %reason, "snapshot written");
        self.prune_snapshots();
        Ok(path)
    }

    /// Newest snapshot on disk by filename timestamp.
    pub fn newest_snapshot(&self) -> Option<PathBuf> {
        let mut snapshots = self.list_snapshots();
        snapshots.sort_by(|a, b| b.0.cmp(&a.0));
        snapshots.into_iter().next().map(|(_, p)| p)
    }

    /// Number of snapshots currently on disk.
    pub fn snapshot_count(&self) -> usize {
        self.list_snapshots().len()
    }

    /// Timestamp-keyed snapshot listing (unparseable names are ignored).
    fn list_snapshots(&self) -> Vec<(String, PathBuf)> {
        let Ok(entries) = std::fs::read_dir(self.paths.snapshots_dir()) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let name = path.file_name()?.to_str()?;
                let key = snapshot_timestamp(name)?;
                Some((format!("{key}/{name}"), path))
            })
            .collect()
    }

    /// Enforce retention newest-first, never deleting the armed snapshot.
    fn prune_snapshots(&self) {
        let mut snapshots = self.list_snapshots();
        snapshots.sort_by(|a, b| b.0.cmp(&a.0));
        let armed = self.ticket.as_ref().map(|t| t.snapshot.clone());
        for (_, path) in snapshots.into_iter().skip(self.retention) {
            if armed.as_deref() == Some(path.as_path()) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(snapshot = %path.display(), "pruned old snapshot"),
                Err(e) => tracing::warn!(snapshot = %path.display(), error = %e, "failed to prune"),
            }
        }
    }

    fn persist_checksum(&mut self, hash: &str) {
        if let Err(e) = write_atomic(&self.paths.checksum_file(), &format!("{hash}\n")) {
            tracing::error!(error = %e, "failed to persist config checksum");
        }
        self.checksum = Some(hash.to_string());
    }

    fn write_ticket(&self, deadline: i64, snapshot: &Path) -> Result<(), String> {
        write_atomic(
            &self.paths.ticket_file(),
            &format!("{deadline}\n{}\n", snapshot.display()),
        )
    }

    fn remove_ticket_file(&self) -> bool {
        std::fs::remove_file(self.paths.ticket_file()).is_ok()
    }
}

/// Reload a persisted ticket, enforcing its invariant.
fn load_ticket(paths: &StatePaths) -> Option<ArmedTicket> {
    let path = paths.ticket_file();
    let content = std::fs::read_to_string(&path).ok()?;
    let mut lines = content.lines();
    let deadline = lines.next().and_then(|l| l.trim().parse::<i64>().ok());
    let snapshot = lines
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from);
    match (deadline, snapshot) {
        (Some(deadline), Some(snapshot)) if snapshot.is_file() => {
            tracing::info!(
                deadline,
                snapshot = %snapshot.display(),
                "re-armed rollback ticket from disk"
            );
            Some(ArmedTicket {
                deadline,
                snapshot,
                healthy_since: None,
            })
        }
        (Some(_), Some(snapshot)) => {
            tracing::error!(
                snapshot = %snapshot.display(),
                "armed ticket references a missing snapshot, dropping ticket"
            );
            let _ = std::fs::remove_file(&path);
            None
        }
        _ => {
            tracing::error!(path = %path.display(), "malformed rollback ticket, dropping");
            let _ = std::fs::remove_file(&path);
            None
        }
    }
}

/// Extract the `YYYYMMDD-HHMMSS` component from a snapshot filename.
fn snapshot_timestamp(file_name: &str) -> Option<String> {
    let name = file_name.strip_suffix(".json").unwrap_or(file_name);
    let parts: Vec<&str> = name.split('-').collect();
    for window in parts.windows(2) {
        let (date, time) = (window[0], window[1]);
        if date.len() == 8
            && time.len() == 6
            && date.chars().all(|c| c.is_ascii_digit())
            && time.chars().all(|c| c.is_ascii_digit())
        {
            return Some(format!("{date}-{time}"));
        }
    }
    None
}
