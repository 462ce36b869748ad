//! Status report assembly for the CLI.
//!
//! Collects supervisor, gateway, safeguard, and backup-archiver state from
//! the state directory and live probes. Read-only: unlike the safeguard's
//! own loader, a corrupt ticket file is reported, never repaired, so
//! `status` stays free of side effects.

use serde::Serialize;

use vigil_types::{StatePaths, WatchdogConfig};

use crate::clock::Clock;
use crate::pidfile;
use crate::probes::SystemProbes;
use crate::signals;

/// Full status snapshot.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub supervisor: SupervisorStatus,
    pub gateway: GatewayStatus,
    pub safeguard: SafeguardStatus,
    pub backup: BackupArchiveStatus,
}

#[derive(Debug, Serialize)]
pub struct SupervisorStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub state_dir: String,
}

#[derive(Debug, Serialize)]
pub struct GatewayStatus {
    pub process_alive: bool,
    pub http_status: Option<u16>,
    pub http_healthy: bool,
    pub online: bool,
    pub external_reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct SafeguardStatus {
    pub checksum_prefix: Option<String>,
    pub armed: bool,
    pub deadline_remaining_secs: Option<i64>,
    pub snapshot_count: usize,
    pub latest_snapshot: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BackupArchiveStatus {
    pub count: usize,
    pub latest: Option<String>,
}

/// Gather everything `vigil status` reports.
pub fn collect(
    config: &WatchdogConfig,
    probes: &dyn SystemProbes,
    clock: &dyn Clock,
) -> StatusReport {
    let paths = StatePaths::new(&config.state_dir);
    let pid = pidfile::read(&paths.pid_file()).filter(|&p| pidfile::is_process_alive(p));

    let http_status =
        probes.http_status(&config.health_check_url, signals::HTTP_PROBE_TIMEOUT_SECS, None);
    let gateway = GatewayStatus {
        process_alive: signals::liveness(probes, config),
        http_status,
        http_healthy: http_status.is_some_and(signals::is_healthy_status),
        online: signals::online(probes, config),
        external_reachable: signals::external_reachable(probes, config),
    };

    let checksum_prefix = std::fs::read_to_string(paths.checksum_file())
        .ok()
        .map(|s| s.trim().chars().take(12).collect::<String>())
        .filter(|s| !s.is_empty());

    let (armed, deadline_remaining_secs) = match read_ticket_deadline(&paths) {
        Some(deadline) => (true, Some(deadline - clock.now_epoch())),
        None => (false, None),
    };

    let (snapshot_count, latest_snapshot) = newest_in(&paths.snapshots_dir());
    let (backup_count, latest_backup) = newest_in(&paths.backups_dir());

    StatusReport {
        supervisor: SupervisorStatus {
            running: pid.is_some(),
            pid,
            state_dir: config.state_dir.display().to_string(),
        },
        gateway,
        safeguard: SafeguardStatus {
            checksum_prefix,
            armed,
            deadline_remaining_secs,
            snapshot_count,
            latest_snapshot,
        },
        backup: BackupArchiveStatus {
            count: backup_count,
            latest: latest_backup,
        },
    }
}

/// Deadline from the ticket file, without mutating anything.
fn read_ticket_deadline(paths: &StatePaths) -> Option<i64> {
    let content = std::fs::read_to_string(paths.ticket_file()).ok()?;
    content.lines().next()?.trim().parse().ok()
}

/// Count files in a directory and name the lexically newest one.
fn newest_in(dir: &std::path::Path) -> (usize, Option<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return (0, None);
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    let latest = names.last().cloned();
    (names.len(), latest)
}

impl StatusReport {
    /// Human-readable sectioned rendering.
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        let yn = |b: bool| if b { "yes" } else { "no" };

        out.push_str("Supervisor\n");
        match self.supervisor.pid {
            Some(pid) => out.push_str(&format!("  running:    yes (pid {pid})\n")),
            None => out.push_str("  running:    no\n"),
        }
        out.push_str(&format!("  state dir:  {}\n", self.supervisor.state_dir));

        out.push_str("\nGateway\n");
        out.push_str(&format!("  process:    {}\n", yn(self.gateway.process_alive)));
        match self.gateway.http_status {
            Some(code) => out.push_str(&format!(
                "  health:     {} (HTTP {code})\n",
                if self.gateway.http_healthy { "ok" } else { "unhealthy" }
            )),
            None => out.push_str("  health:     unreachable\n"),
        }
        out.push_str(&format!("  network:    {}\n", yn(self.gateway.online)));
        out.push_str(&format!(
            "  external:   {}\n",
            yn(self.gateway.external_reachable)
        ));

        out.push_str("\nConfig safeguard\n");
        out.push_str(&format!(
            "  checksum:   {}\n",
            self.safeguard.checksum_prefix.as_deref().unwrap_or("(none)")
        ));
        match self.safeguard.deadline_remaining_secs {
            Some(remaining) if self.safeguard.armed => out.push_str(&format!(
                "  armed:      yes ({remaining}s until auto-confirm)\n"
            )),
            _ => out.push_str("  armed:      no\n"),
        }
        out.push_str(&format!(
            "  snapshots:  {}{}\n",
            self.safeguard.snapshot_count,
            self.safeguard
                .latest_snapshot
                .as_deref()
                .map(|n| format!(" (latest: {n})"))
                .unwrap_or_default()
        ));

        out.push_str("\nBackup archiver\n");
        out.push_str(&format!(
            "  copies:     {}{}\n",
            self.backup.count,
            self.backup
                .latest
                .as_deref()
                .map(|n| format!(" (latest: {n})"))
                .unwrap_or_default()
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeClock, MockProbes};

    fn fixture() -> (tempfile::TempDir, WatchdogConfig) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = WatchdogConfig::default();
        config.state_dir = tmp.path().join("vigil");
        config.config_path = tmp.path().join("gateway.json");
        (tmp, config)
    }

    #[test]
    fn empty_state_reports_not_running_and_unarmed() {
        let (_tmp, config) = fixture();
        let probes = MockProbes::new();
        let clock = FakeClock::new(1_000);
        let report = collect(&config, &probes, &clock);
        assert!(!report.supervisor.running);
        assert!(!report.safeguard.armed);
        assert_eq!(report.safeguard.snapshot_count, 0);
        assert_eq!(report.backup.count, 0);
    }

    #[test]
    fn armed_ticket_reports_remaining_time() {
        let (_tmp, config) = fixture();
        let paths = StatePaths::new(&config.state_dir);
        paths.ensure_dirs().unwrap();
        let snap = paths.snapshots_dir().join("gateway-20260802-010203-manual.json");
        std::fs::write(&snap, "{}").unwrap();
        std::fs::write(
            paths.ticket_file(),
            format!("1300\n{}\n", snap.display()),
        )
        .unwrap();

        let probes = MockProbes::new();
        let clock = FakeClock::new(1_000);
        let report = collect(&config, &probes, &clock);
        assert!(report.safeguard.armed);
        assert_eq!(report.safeguard.deadline_remaining_secs, Some(300));
        assert_eq!(report.safeguard.snapshot_count, 1);
        // Status must not repair or remove anything.
        assert!(paths.ticket_file().exists());
    }

    #[test]
    fn gateway_health_uses_status_classes() {
        let (_tmp, config) = fixture();
        let probes = MockProbes::new();
        probes.set_http(&config.health_check_url, Some(403));
        probes.set_http(&config.discord_check_url, Some(200));
        let clock = FakeClock::new(1_000);
        let report = collect(&config, &probes, &clock);
        assert!(report.gateway.http_healthy);
        assert!(report.gateway.external_reachable);
    }

    #[test]
    fn human_rendering_has_all_sections() {
        let (_tmp, config) = fixture();
        let probes = MockProbes::new();
        let clock = FakeClock::new(1_000);
        let text = collect(&config, &probes, &clock).render_human();
        assert!(text.contains("Supervisor"));
        assert!(text.contains("Gateway"));
        assert!(text.contains("Config safeguard"));
        assert!(text.contains("Backup archiver"));
    }

    #[test]
    fn report_serializes_to_json() {
        let (_tmp, config) = fixture();
        let probes = MockProbes::new();
        let clock = FakeClock::new(1_000);
        let report = collect(&config, &probes, &clock);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["supervisor"]["running"], false);
        assert!(json["safeguard"]["snapshot_count"].is_u64());
    }
}
