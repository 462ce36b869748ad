//! Watchdog configuration.
//!
//! [`WatchdogConfig`] is loaded once at startup from a key=value file
//! (shell-like assignments, `#` comments, optional quotes) layered over
//! built-in defaults, and never mutated during a run. Every recognized key
//! has a default so an empty or missing file yields a working supervisor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths::default_state_dir;
use crate::VigilError;

/// One supervised agent: a name and the workspace directory holding its
/// heartbeat state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWorkspace {
    /// Agent name as it appears in logs and status output.
    pub name: String,
    /// Workspace directory (already `~`-expanded).
    pub dir: PathBuf,
}

/// Immutable runtime parameters for the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Tick period in seconds.
    pub check_interval: u64,
    /// Minimum wall-clock seconds between authorized restarts.
    pub cooldown: u64,
    /// First backoff wait in seconds.
    pub backoff_initial: u64,
    /// Backoff ceiling in seconds.
    pub backoff_max: u64,
    /// Backoff escalation factor.
    pub backoff_multiplier: u64,

    /// Gateway HTTP health endpoint.
    pub health_check_url: String,
    /// ICMP echo target for the `online` signal.
    pub ping_target: String,
    /// ICMP timeout in seconds.
    pub ping_timeout: u64,
    /// External-reachable probe URL (must return 200).
    pub discord_check_url: String,
    /// Optional egress proxy URL; empty means no proxy is checked.
    pub proxy_url: Option<String>,
    /// URL probed through the proxy.
    pub llm_api_check_url: String,
    /// Proxy is checked every this-many ticks.
    pub proxy_check_interval: u64,
    /// Consecutive proxy failures that authorize a restart.
    pub proxy_fail_threshold: u32,
    /// Settle delay in seconds after wake or network recovery.
    pub tun_settle: u64,

    /// Agent heartbeat probe rate limit in seconds.
    pub heartbeat_check_interval: u64,
    /// Agent staleness threshold in minutes.
    pub heartbeat_threshold_min: i64,
    /// Supervised agents, from `AGENT_WORKSPACES`.
    pub agent_workspaces: Vec<AgentWorkspace>,

    /// Watched gateway config file.
    pub config_path: PathBuf,
    /// Confirm-or-revert window in seconds.
    pub rollback_timeout: u64,
    /// Snapshots retained, newest first.
    pub snapshot_retention: usize,

    /// Service-manager label of the managed gateway.
    pub service_label: String,
    /// Process-table pattern for the liveness probe.
    pub process_pattern: String,

    /// Log file trim threshold in lines.
    pub max_log_lines: usize,

    /// Backup archiver rate limit in seconds.
    pub backup_interval: u64,
    /// Backup copies retained.
    pub backup_retention: usize,

    /// State directory root.
    pub state_dir: PathBuf,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Self {
            check_interval: 15,
            cooldown: 300,
            backoff_initial: 30,
            backoff_max: 300,
            backoff_multiplier: 2,

            health_check_url: "http://127.0.0.1:18789/health".into(),
            ping_target: "1.1.1.1".into(),
            ping_timeout: 3,
            discord_check_url: "https://discord.com/api/v10/gateway".into(),
            proxy_url: None,
            llm_api_check_url: "https://api.anthropic.com/v1/models".into(),
            proxy_check_interval: 4,
            proxy_fail_threshold: 3,
            tun_settle: 20,

            heartbeat_check_interval: 600,
            heartbeat_threshold_min: 120,
            agent_workspaces: Vec::new(),

            config_path: PathBuf::from(&home).join(".gateway").join("gateway.json"),
            rollback_timeout: 300,
            snapshot_retention: 10,

            service_label: "com.gateway.daemon".into(),
            process_pattern: "gateway".into(),

            max_log_lines: 10_000,

            backup_interval: 3600,
            backup_retention: 24,

            state_dir: default_state_dir(),
        }
    }
}

impl WatchdogConfig {
    /// Load the config file at `path` over the defaults.
    ///
    /// A missing file is not an error: defaults apply unchanged.
    pub fn load(path: &Path) -> Result<Self, VigilError> {
        let mut config = Self::default();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
            Err(e) => {
                return Err(VigilError::ConfigError(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };
        config.apply_str(&content)?;
        Ok(config)
    }

    /// Parse shell-like `KEY=value` assignments from a string.
    pub fn apply_str(&mut self, content: &str) -> Result<(), VigilError> {
        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
            let Some((key, value)) = line.split_once('=') else {
                return Err(VigilError::ConfigError(format!(
                    "line {}: expected KEY=value, got '{raw}'",
                    lineno + 1
                )));
            };
            self.apply(key.trim(), unquote(value.trim()))
                .map_err(|e| VigilError::ConfigError(format!("line {}: {e}", lineno + 1)))?;
        }
        Ok(())
    }

    /// Apply one key=value assignment.
    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "CHECK_INTERVAL" => self.check_interval = parse_u64(key, value)?,
            "COOLDOWN" => self.cooldown = parse_u64(key, value)?,
            "BACKOFF_INITIAL" => self.backoff_initial = parse_u64(key, value)?,
            "BACKOFF_MAX" => self.backoff_max = parse_u64(key, value)?,
            "BACKOFF_MULTIPLIER" => self.backoff_multiplier = parse_u64(key, value)?,

            "HEALTH_CHECK_URL" => self.health_check_url = value.into(),
            "PING_TARGET" => self.ping_target = value.into(),
            "PING_TIMEOUT" => self.ping_timeout = parse_u64(key, value)?,
            "DISCORD_CHECK_URL" => self.discord_check_url = value.into(),
            "PROXY_URL" => {
                self.proxy_url = if value.is_empty() { None } else { Some(value.into()) }
            }
            "LLM_API_CHECK_URL" => self.llm_api_check_url = value.into(),
            "PROXY_CHECK_INTERVAL" => self.proxy_check_interval = parse_u64(key, value)?,
            "PROXY_FAIL_THRESHOLD" => {
                self.proxy_fail_threshold = parse_u64(key, value)? as u32
            }
            "TUN_SETTLE" => self.tun_settle = parse_u64(key, value)?,

            "HEARTBEAT_CHECK_INTERVAL" => {
                self.heartbeat_check_interval = parse_u64(key, value)?
            }
            "HEARTBEAT_THRESHOLD_MIN" => {
                self.heartbeat_threshold_min = parse_u64(key, value)? as i64
            }
            "AGENT_WORKSPACES" => self.agent_workspaces = parse_workspaces(value)?,

            "CONFIG_PATH" => self.config_path = expand_tilde(value),
            "ROLLBACK_TIMEOUT" => self.rollback_timeout = parse_u64(key, value)?,
            "SNAPSHOT_RETENTION" => self.snapshot_retention = parse_u64(key, value)? as usize,

            "SERVICE_LABEL" => self.service_label = value.into(),
            "PROCESS_PATTERN" => self.process_pattern = value.into(),

            "MAX_LOG_LINES" => self.max_log_lines = parse_u64(key, value)? as usize,

            "BACKUP_INTERVAL" => self.backup_interval = parse_u64(key, value)?,
            "BACKUP_RETENTION" => self.backup_retention = parse_u64(key, value)? as usize,

            "STATE_DIR" => self.state_dir = expand_tilde(value),

            other => {
                tracing::warn!(key = other, "unknown config key, ignoring");
            }
        }
        Ok(())
    }

    /// Validate cross-field constraints that a key=value file can violate.
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.check_interval == 0 {
            return Err(VigilError::ConfigError("CHECK_INTERVAL must be > 0".into()));
        }
        if self.backoff_multiplier < 2 {
            return Err(VigilError::ConfigError(
                "BACKOFF_MULTIPLIER must be at least 2".into(),
            ));
        }
        if self.backoff_initial == 0 || self.backoff_initial > self.backoff_max {
            return Err(VigilError::ConfigError(format!(
                "BACKOFF_INITIAL ({}) must be > 0 and <= BACKOFF_MAX ({})",
                self.backoff_initial, self.backoff_max
            )));
        }
        if self.snapshot_retention == 0 {
            return Err(VigilError::ConfigError(
                "SNAPSHOT_RETENTION must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("{key} must be a non-negative integer, got '{value}'"))
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Expand a leading `~` or `~/` to `$HOME`.
fn expand_tilde(value: &str) -> PathBuf {
    if value == "~" || value.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        if value == "~" {
            return PathBuf::from(home);
        }
        return PathBuf::from(home).join(&value[2..]);
    }
    PathBuf::from(value)
}

/// Parse `AGENT_WORKSPACES`: space-separated `name:path` pairs.
fn parse_workspaces(value: &str) -> Result<Vec<AgentWorkspace>, String> {
    let mut out = Vec::new();
    for pair in value.split_whitespace() {
        let Some((name, path)) = pair.split_once(':') else {
            return Err(format!("AGENT_WORKSPACES entry '{pair}' is not name:path"));
        };
        if name.is_empty() || path.is_empty() {
            return Err(format!("AGENT_WORKSPACES entry '{pair}' has an empty field"));
        }
        out.push(AgentWorkspace {
            name: name.to_string(),
            dir: expand_tilde(path),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = WatchdogConfig::default();
        assert_eq!(config.check_interval, 15);
        assert_eq!(config.backoff_initial, 30);
        assert_eq!(config.backoff_max, 300);
        assert!(config.proxy_url.is_none());
        assert!(config.agent_workspaces.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn apply_str_overrides_defaults() {
        let mut config = WatchdogConfig::default();
        config
            .apply_str(
                "# watchdog config\n\
                 CHECK_INTERVAL=30\n\
                 COOLDOWN=120\n\
                 HEALTH_CHECK_URL=\"http://localhost:9999/healthz\"\n\
                 PROXY_URL='http://127.0.0.1:8118'\n",
            )
            .unwrap();
        assert_eq!(config.check_interval, 30);
        assert_eq!(config.cooldown, 120);
        assert_eq!(config.health_check_url, "http://localhost:9999/healthz");
        assert_eq!(config.proxy_url.as_deref(), Some("http://127.0.0.1:8118"));
    }

    #[test]
    fn export_prefix_and_blank_lines_accepted() {
        let mut config = WatchdogConfig::default();
        config
            .apply_str("\nexport PING_TARGET=8.8.8.8\n\n")
            .unwrap();
        assert_eq!(config.ping_target, "8.8.8.8");
    }

    #[test]
    fn empty_proxy_url_means_unset() {
        let mut config = WatchdogConfig::default();
        config.apply_str("PROXY_URL=http://p:1").unwrap();
        assert!(config.proxy_url.is_some());
        config.apply_str("PROXY_URL=").unwrap();
        assert!(config.proxy_url.is_none());
    }

    #[test]
    fn malformed_line_is_rejected_with_line_number() {
        let mut config = WatchdogConfig::default();
        let err = config.apply_str("CHECK_INTERVAL=15\nnot a line\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        let mut config = WatchdogConfig::default();
        let err = config.apply_str("CHECK_INTERVAL=soon").unwrap_err();
        assert!(err.to_string().contains("CHECK_INTERVAL"));
    }

    #[test]
    fn unknown_key_is_ignored() {
        let mut config = WatchdogConfig::default();
        config.apply_str("NO_SUCH_KEY=1").unwrap();
        assert_eq!(config.check_interval, 15);
    }

    #[test]
    fn workspaces_parse_and_expand() {
        std::env::set_var("HOME", "/home/op");
        let mut config = WatchdogConfig::default();
        config
            .apply_str("AGENT_WORKSPACES=main:~/agents/main scout:/srv/scout")
            .unwrap();
        assert_eq!(config.agent_workspaces.len(), 2);
        assert_eq!(config.agent_workspaces[0].name, "main");
        assert_eq!(
            config.agent_workspaces[0].dir,
            PathBuf::from("/home/op/agents/main")
        );
        assert_eq!(config.agent_workspaces[1].dir, PathBuf::from("/srv/scout"));
    }

    #[test]
    fn workspaces_without_colon_rejected() {
        let mut config = WatchdogConfig::default();
        assert!(config.apply_str("AGENT_WORKSPACES=justaname").is_err());
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = WatchdogConfig::load(&tmp.path().join("nope.conf")).unwrap();
        assert_eq!(config.check_interval, 15);
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("watchdog.conf");
        std::fs::write(&path, "ROLLBACK_TIMEOUT=600\nSNAPSHOT_RETENTION=5\n").unwrap();
        let config = WatchdogConfig::load(&path).unwrap();
        assert_eq!(config.rollback_timeout, 600);
        assert_eq!(config.snapshot_retention, 5);
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut config = WatchdogConfig::default();
        config.check_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_backoff_initial_above_max() {
        let mut config = WatchdogConfig::default();
        config.backoff_initial = 400;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unquote_handles_mismatched_quotes() {
        assert_eq!(unquote("\"half"), "\"half");
        assert_eq!(unquote("'full'"), "full");
        assert_eq!(unquote("plain"), "plain");
    }
}
