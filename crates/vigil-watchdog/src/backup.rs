//! Periodic config backup archiver.
//!
//! A rate-limited side task the tick loop drives: at most once per
//! `BACKUP_INTERVAL` it copies the watched config into a versioned store
//! under the state directory. The git-backed history variant lives outside
//! this process; only this interface (tick + status) is relied on.

use chrono::{DateTime, Utc};

use vigil_types::WatchdogConfig;

use crate::clock::Clock;

/// Archiver state surfaced by the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupStatus {
    /// Epoch of the last completed run.
    pub last_run: Option<i64>,
    /// Completed runs this process lifetime.
    pub runs: u64,
    /// Message of the most recent failure, if any.
    pub last_error: Option<String>,
}

/// Rate-limited file-history archiver for the watched config.
#[derive(Debug, Default)]
pub struct ConfigBackup {
    last_run: Option<i64>,
    runs: u64,
    last_error: Option<String>,
}

impl ConfigBackup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run is due.
    pub fn is_due(&self, now: i64, interval_secs: u64) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_sub(last) >= interval_secs as i64,
        }
    }

    /// Archive the config if due. Returns whether a copy was made.
    pub fn tick(&mut self, clock: &dyn Clock, config: &WatchdogConfig) -> bool {
        let now = clock.now_epoch();
        if !self.is_due(now, config.backup_interval) {
            return false;
        }
        if !config.config_path.is_file() {
            tracing::debug!(path = %config.config_path.display(), "no config to back up");
            return false;
        }
        self.last_run = Some(now);
        match archive_copy(config, now) {
            Ok(name) => {
                self.runs += 1;
                self.last_error = None;
                tracing::info!(backup = %name, "config backed up");
                prune_backups(config);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "config backup failed");
                self.last_error = Some(e);
                false
            }
        }
    }

    pub fn status(&self) -> BackupStatus {
        BackupStatus {
            last_run: self.last_run,
            runs: self.runs,
            last_error: self.last_error.clone(),
        }
    }
}

fn archive_copy(config: &WatchdogConfig, now: i64) -> Result<String, String> {
    let dir = vigil_types::StatePaths::new(&config.state_dir).backups_dir();
    std::fs::create_dir_all(&dir).map_err(|e| format!("failed to create backup dir: {e}"))?;
    let stem = config
        .config_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("config");
    let stamp = DateTime::<Utc>::from_timestamp(now, 0)
        .unwrap_or_default()
        .format("%Y%m%d-%H%M%S");
    let name = format!("{stem}-{stamp}.json");
    std::fs::copy(&config.config_path, dir.join(&name))
        .map_err(|e| format!("failed to copy config: {e}"))?;
    Ok(name)
}

/// Keep the newest `backup_retention` copies.
fn prune_backups(config: &WatchdogConfig) {
    let dir = vigil_types::StatePaths::new(&config.state_dir).backups_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return;
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort_by(|a, b| b.cmp(a));
    for name in names.into_iter().skip(config.backup_retention) {
        let _ = std::fs::remove_file(dir.join(name));
    }
}
