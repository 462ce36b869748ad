//! State-directory layout.
//!
//! Everything the watchdog persists lives under a single root (default
//! `~/.vigil`): the pid file, the config checksum, the armed-rollback
//! ticket, snapshots, backups, and the log file.
//!
//! ```text
//! watchdog.pid                 decimal pid
//! watchdog.log                 append-only supervisor log
//! state/config-checksum        hex SHA-256 of the current gateway config
//! state/rollback-armed.flag    line 1: deadline epoch; line 2: snapshot path
//! snapshots/                   <stem>-YYYYMMDD-HHMMSS-<reason>.json
//! backups/                     <stem>-YYYYMMDD-HHMMSS.json
//! ```

use std::path::{Path, PathBuf};

/// Resolved locations of every persisted artifact under one state root.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Bind the layout to a state root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The state root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pid file marking the single running watchdog instance.
    pub fn pid_file(&self) -> PathBuf {
        self.root.join("watchdog.pid")
    }

    /// Append-only supervisor log.
    pub fn log_file(&self) -> PathBuf {
        self.root.join("watchdog.log")
    }

    /// Directory for small persisted state files.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Hex SHA-256 of the gateway config as last observed.
    pub fn checksum_file(&self) -> PathBuf {
        self.state_dir().join("config-checksum")
    }

    /// Durable armed-rollback ticket.
    pub fn ticket_file(&self) -> PathBuf {
        self.state_dir().join("rollback-armed.flag")
    }

    /// Directory holding config snapshots.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    /// Directory holding periodic config backups.
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Create every directory the watchdog writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.state_dir())?;
        std::fs::create_dir_all(self.snapshots_dir())?;
        std::fs::create_dir_all(self.backups_dir())?;
        Ok(())
    }
}

/// Default state root: `$VIGIL_STATE_DIR`, else `~/.vigil`.
pub fn default_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VIGIL_STATE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".vigil")
}

/// Default location of the watchdog's own key=value config file:
/// `$VIGIL_CONFIG`, else `<state root>/watchdog.conf`.
pub fn default_config_file() -> PathBuf {
    if let Ok(path) = std::env::var("VIGIL_CONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    default_state_dir().join("watchdog.conf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let paths = StatePaths::new("/tmp/vigil-test");
        assert_eq!(paths.pid_file(), PathBuf::from("/tmp/vigil-test/watchdog.pid"));
        assert_eq!(
            paths.checksum_file(),
            PathBuf::from("/tmp/vigil-test/state/config-checksum")
        );
        assert_eq!(
            paths.ticket_file(),
            PathBuf::from("/tmp/vigil-test/state/rollback-armed.flag")
        );
        assert!(paths.snapshots_dir().ends_with("snapshots"));
        assert!(paths.backups_dir().ends_with("backups"));
        assert!(paths.log_file().ends_with("watchdog.log"));
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = StatePaths::new(tmp.path().join("root"));
        paths.ensure_dirs().unwrap();
        assert!(paths.state_dir().is_dir());
        assert!(paths.snapshots_dir().is_dir());
        assert!(paths.backups_dir().is_dir());
    }
}
