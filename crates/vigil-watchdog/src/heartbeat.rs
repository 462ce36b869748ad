//! Agent staleness probe.
//!
//! Detects the "process alive, scheduler dead" failure mode: each configured
//! agent workspace carries a state file recording the agent's last heartbeat
//! timestamp. When every signal says the gateway is healthy but agents have
//! stopped heartbeating, the scheduler inside the gateway is the likely
//! culprit.
//!
//! This module never initiates a restart for a healthy gateway. It requests
//! one (through the shared cooldown) only when liveness already says the
//! gateway process is gone.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};

use vigil_types::WatchdogConfig;

use crate::clock::Clock;
use crate::probes::SystemProbes;
use crate::restart::RestartManager;
use crate::signals;

/// Fixed sub-path of the heartbeat state file inside each agent workspace.
pub const HEARTBEAT_STATE_SUBPATH: &str = "state/heartbeat.json";

/// Freshness classification for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Heartbeat within the threshold.
    Fresh { minutes: i64 },
    /// Heartbeat older than the threshold.
    Stale { minutes: i64 },
    /// State file absent.
    Missing,
    /// State file present but the timestamp did not parse.
    Unparseable,
}

/// One agent's check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    pub name: String,
    pub freshness: Freshness,
}

/// Rate-limited staleness monitor over the configured agent workspaces.
#[derive(Debug, Default)]
pub struct AgentHeartbeat {
    last_check: Option<i64>,
}

impl AgentHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether enough time has passed since the last probe.
    pub fn is_due(&self, now: i64, interval_secs: u64) -> bool {
        match self.last_check {
            None => true,
            Some(last) => now.saturating_sub(last) >= interval_secs as i64,
        }
    }

    /// Run the staleness probe if due. Returns the per-agent reports, or
    /// `None` when rate-limited or no workspaces are configured.
    pub fn tick(
        &mut self,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) -> Option<Vec<AgentReport>> {
        if config.agent_workspaces.is_empty() {
            return None;
        }
        let now = clock.now_epoch();
        if !self.is_due(now, config.heartbeat_check_interval) {
            return None;
        }
        self.last_check = Some(now);

        let mut reports = Vec::with_capacity(config.agent_workspaces.len());
        for workspace in &config.agent_workspaces {
            let freshness = classify_workspace(&workspace.dir, now, config.heartbeat_threshold_min);
            match &freshness {
                Freshness::Fresh { minutes } => {
                    tracing::debug!(agent = %workspace.name, minutes_stale = minutes, "agent fresh");
                }
                Freshness::Stale { minutes } => {
                    tracing::warn!(agent = %workspace.name, minutes_stale = minutes, "agent heartbeat stale");
                }
                Freshness::Missing => {
                    tracing::debug!(agent = %workspace.name, "no heartbeat state file");
                }
                Freshness::Unparseable => {
                    tracing::warn!(agent = %workspace.name, "heartbeat timestamp did not parse");
                }
            }
            reports.push(AgentReport {
                name: workspace.name.clone(),
                freshness,
            });
        }

        let any_stale = reports
            .iter()
            .any(|r| matches!(r.freshness, Freshness::Stale { .. }));
        if any_stale {
            self.escalate(probes, clock, config, restart);
        }
        Some(reports)
    }

    /// Escalation matrix for stale agents, keyed off gateway health.
    fn escalate(
        &mut self,
        probes: &dyn SystemProbes,
        clock: &dyn Clock,
        config: &WatchdogConfig,
        restart: &mut RestartManager,
    ) {
        if !signals::liveness(probes, config) {
            tracing::warn!("agents stale and gateway process gone, requesting restart");
            restart.try_restart("agents-stale-gateway-dead", probes, clock, config);
        } else if !signals::http_health(probes, config) {
            // The health module owns this case and will back off.
            tracing::info!("agents stale while gateway unresponsive, leaving to backoff");
        } else {
            tracing::warn!(
                "agents stale but gateway fully healthy, likely internal scheduler failure; \
                 restart remains a manual call"
            );
        }
    }
}

/// Classify one workspace by its heartbeat state file.
fn classify_workspace(dir: &Path, now: i64, threshold_min: i64) -> Freshness {
    let path = dir.join(HEARTBEAT_STATE_SUBPATH);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return Freshness::Missing,
    };
    let Some(last) = extract_timestamp(&content) else {
        return Freshness::Unparseable;
    };
    let minutes = (now - last.timestamp()) / 60;
    if minutes > threshold_min {
        Freshness::Stale { minutes }
    } else {
        Freshness::Fresh { minutes }
    }
}

/// Pull the heartbeat timestamp out of a state file.
///
/// Accepts a JSON object with a `last_heartbeat` (or `lastHeartbeat`) field,
/// or the whole file as a bare timestamp string.
fn extract_timestamp(content: &str) -> Option<DateTime<Utc>> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        if let Some(s) = value
            .get("last_heartbeat")
            .or_else(|| value.get("lastHeartbeat"))
            .and_then(|v| v.as_str())
        {
            return parse_heartbeat_timestamp(s);
        }
        if let Some(s) = value.as_str() {
            return parse_heartbeat_timestamp(s);
        }
    }
    parse_heartbeat_timestamp(content.trim())
}

/// Parse an ISO-8601-like timestamp. A missing offset means UTC.
pub fn parse_heartbeat_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    None
}
