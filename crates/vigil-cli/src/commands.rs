//! Command implementations behind the `vigil` dispatcher.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use vigil_types::{paths, StatePaths, WatchdogConfig};
use vigil_watchdog::clock::Clock;
use vigil_watchdog::safeguard::SnapshotReason;
use vigil_watchdog::status;
use vigil_watchdog::{pidfile, ConfigSafeguard, HostProbes, RestartManager, Supervisor, SystemClock};

/// Load the watchdog config from the override path or the default location.
fn load_config(override_path: Option<&Path>) -> anyhow::Result<WatchdogConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(paths::default_config_file);
    let config = WatchdogConfig::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Run the supervision loop in the foreground, logging to the state-dir log
/// file so service-managed runs keep history.
pub fn start(config_path: Option<&Path>, filter: EnvFilter) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let state_paths = StatePaths::new(&config.state_dir);
    state_paths.ensure_dirs()?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(state_paths.log_file())
        .with_context(|| format!("failed to open {}", state_paths.log_file().display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Arc::new(log_file))
        .init();

    let mut supervisor = Supervisor::new(config)?;
    supervisor.install_signal_handlers()?;
    println!(
        "Watchdog starting (pid {}), logging to {}",
        std::process::id(),
        state_paths.log_file().display()
    );
    supervisor.run(&HostProbes, &SystemClock)?;
    Ok(())
}

/// SIGTERM the recorded watchdog process.
pub fn stop(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let pid_path = StatePaths::new(&config.state_dir).pid_file();
    let Some(pid) = pidfile::live_pid(&pid_path) else {
        println!("Watchdog is not running.");
        return Ok(());
    };
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(i32::try_from(pid)?),
        nix::sys::signal::Signal::SIGTERM,
    )
    .with_context(|| format!("failed to signal pid {pid}"))?;
    println!("Sent SIGTERM to watchdog (pid {pid}).");
    Ok(())
}

/// Print the status report.
pub fn status(config_path: Option<&Path>, format: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let report = status::collect(&config, &HostProbes, &SystemClock);
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => print!("{}", report.render_human()),
        other => bail!("unknown format '{other}' (expected text or json)"),
    }
    Ok(())
}

/// Disarm the pending rollback window.
pub fn confirm(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut safeguard = ConfigSafeguard::load(&config);
    if safeguard.confirm() {
        println!("Config change confirmed; rollback window disarmed.");
    } else {
        println!("Nothing armed; nothing to confirm.");
    }
    Ok(())
}

/// Restore the gateway config from a snapshot and restart the gateway.
pub fn rollback(config_path: Option<&Path>, snapshot: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut safeguard = ConfigSafeguard::load(&config);
    let mut restart = RestartManager::new(config.cooldown);
    let used = safeguard.rollback(snapshot, &HostProbes, &SystemClock, &config, &mut restart)?;
    println!("Config rolled back from {}.", used.display());
    Ok(())
}

/// Take a manual snapshot of the gateway config.
pub fn snapshot(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut safeguard = ConfigSafeguard::load(&config);
    let path = safeguard.snapshot(SnapshotReason::Manual, SystemClock.now_epoch())?;
    println!("Snapshot written to {}.", path.display());
    Ok(())
}
